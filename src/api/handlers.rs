use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    db::CacheKey,
    error::{AppError, AppResult},
    models::{EvaluationReport, ModelSummary, RecommendationBatch, RefreshReport},
    services::{
        pipeline, Evaluator, Metric, RecommendationService, SamplingConfig,
    },
};

use super::AppState;

// Request types

#[derive(Debug, Default, Deserialize)]
pub struct EvaluateRequest {
    pub metric: Option<String>,
    pub filter_invalid: Option<bool>,
    pub get_all: Option<bool>,
    pub n_new_combos: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub n: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub n: Option<usize>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Fit a new model on the current edge table and install it
pub async fn train_model(State(state): State<AppState>) -> AppResult<Json<ModelSummary>> {
    let snapshot = pipeline::train_from_store(
        state.store.clone(),
        state.context.clone(),
        state.config.als_params(),
    )
    .await?;

    let summary = snapshot.model.summary();
    state.install(snapshot).await;

    Ok(Json(summary))
}

/// Summary of the installed model
pub async fn get_model(State(state): State<AppState>) -> AppResult<Json<ModelSummary>> {
    let snapshot = state.snapshot().await?;
    Ok(Json(snapshot.model.summary()))
}

/// Score the installed model against its edges plus synthesized negatives
pub async fn evaluate_model(
    State(state): State<AppState>,
    body: Option<Json<EvaluateRequest>>,
) -> AppResult<Json<EvaluationReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let snapshot = state.snapshot().await?;

    let metric = match request.metric.as_deref() {
        Some(name) => name
            .parse::<Metric>()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?,
        None => state.config.eval_metric,
    };
    let evaluator = Evaluator::new(
        metric,
        request
            .filter_invalid
            .unwrap_or(state.config.eval_filter_invalid),
    );

    let defaults = state.config.sampling_config();
    let sampling = SamplingConfig {
        get_all: request.get_all.unwrap_or(defaults.get_all),
        n_new_combos: request.n_new_combos.or(defaults.n_new_combos),
        seed: request.seed.unwrap_or(defaults.seed),
        ..defaults
    };

    tracing::info!(
        model_version = %snapshot.model.version(),
        metric = %metric,
        exhaustive = sampling.get_all,
        "Processing evaluation request"
    );

    let context = state.context.clone();
    let report = tokio::task::spawn_blocking(move || {
        pipeline::evaluate_model(
            &context,
            &snapshot.model,
            &snapshot.edges,
            sampling,
            evaluator,
        )
    })
    .await??;

    Ok(Json(report))
}

/// Top-N unseen songs for one sampling song
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationBatch>> {
    let n = query.n.unwrap_or(state.config.n_recommendations);
    let snapshot = state.snapshot().await?;
    let service = RecommendationService::new(state.context.progress_interval());

    let compute = async {
        service.recommend_for_one(snapshot.model.as_ref(), &snapshot.known, user_id, n)
    };

    let batch = match &state.cache {
        Some(cache) => {
            let key = CacheKey::Recommendations {
                model_version: snapshot.model.version(),
                user_id,
                n,
            };
            crate::cached!(cache, key, state.config.cache_ttl_secs, compute)?
        }
        None => compute.await?,
    };

    Ok(Json(batch))
}

/// Regenerate and persist recommendations for every song
pub async fn refresh_recommendations(
    State(state): State<AppState>,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<Json<RefreshReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let n = request.n.unwrap_or(state.config.n_recommendations);
    let snapshot = state.snapshot().await?;

    let report = pipeline::refresh_recommendations(
        state.store.clone(),
        snapshot,
        RecommendationService::new(state.context.progress_interval()),
        n,
    )
    .await?;

    Ok(Json(report))
}
