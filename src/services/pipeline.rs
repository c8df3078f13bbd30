use std::sync::Arc;
use std::time::Instant;

use crate::{
    context::ExecutionContext,
    db::EdgeStore,
    error::{AppError, AppResult},
    models::{EdgeSet, EvaluationReport, KnownEdges, RefreshReport},
    services::{
        evaluator::Evaluator,
        model::FittedModel,
        recommendations::RecommendationService,
        sampler::{NegativeSampleSynthesizer, SamplingConfig},
        trainer::{AlsParams, ModelTrainer},
    },
};

/// A fitted model together with the edges it was fitted on
///
/// Swapped wholesale after every successful fit; never mutated.
#[derive(Clone)]
pub struct TrainedSnapshot {
    pub model: Arc<FittedModel>,
    pub edges: Arc<EdgeSet>,
    pub known: Arc<KnownEdges>,
}

impl TrainedSnapshot {
    pub fn new(model: FittedModel, edges: EdgeSet) -> Self {
        let known = KnownEdges::from_edges(&edges);
        Self {
            model: Arc::new(model),
            edges: Arc::new(edges),
            known: Arc::new(known),
        }
    }
}

/// Loads every edge from the store and fits a model on them
///
/// Fitting runs on the blocking pool.
pub async fn train_from_store(
    store: Arc<dyn EdgeStore>,
    ctx: Arc<ExecutionContext>,
    params: AlsParams,
) -> AppResult<TrainedSnapshot> {
    let start = Instant::now();
    let edges = store.fetch_edges().await?;

    tracing::info!(
        store = store.name(),
        edges = edges.len(),
        positives = edges.positive_count(),
        "Training from edge store"
    );

    let snapshot = tokio::task::spawn_blocking(move || -> AppResult<TrainedSnapshot> {
        let model = ModelTrainer::new(&ctx, params).fit(&edges)?;
        Ok(TrainedSnapshot::new(model, edges))
    })
    .await??;

    tracing::info!(
        model_version = %snapshot.model.version(),
        processing_time_ms = start.elapsed().as_millis(),
        "Model installed"
    );

    Ok(snapshot)
}

/// Scores `model` on its training edges plus synthesized negatives
pub fn evaluate_model(
    ctx: &ExecutionContext,
    model: &FittedModel,
    edges: &EdgeSet,
    sampling: SamplingConfig,
    evaluator: Evaluator,
) -> AppResult<EvaluationReport> {
    let start = Instant::now();

    let evaluation_set = NegativeSampleSynthesizer::new(ctx, sampling).synthesize(edges)?;
    let predictions = model.transform(&evaluation_set);
    let score = evaluator.evaluate(&predictions)?;

    let report = EvaluationReport {
        metric: evaluator.metric().to_string(),
        value: score.value,
        positives: edges.positive_count(),
        negatives: evaluation_set.len() - edges.len(),
        scored: score.scored,
        filtered_out: score.filtered_out,
        processing_time_ms: start.elapsed().as_millis(),
    };

    tracing::info!(
        metric = %report.metric,
        value = report.value,
        scored = report.scored,
        filtered_out = report.filtered_out,
        "Model evaluated"
    );

    Ok(report)
}

/// Regenerates recommendations for every user and replaces the stored table
pub async fn refresh_recommendations(
    store: Arc<dyn EdgeStore>,
    snapshot: TrainedSnapshot,
    service: RecommendationService,
    n: usize,
) -> AppResult<RefreshReport> {
    let start = Instant::now();
    let model_version = snapshot.model.version();

    let (users, rows) = tokio::task::spawn_blocking(move || -> AppResult<_> {
        let batches = service.recommend_for_all(snapshot.model.as_ref(), &snapshot.known, n)?;
        Ok((batches.len(), RecommendationService::to_rows(&batches)))
    })
    .await??;

    let rows_written = store.save_recommendations(&rows).await?;
    if rows_written != rows.len() as u64 {
        return Err(AppError::Internal(format!(
            "Stored {} of {} recommendation rows",
            rows_written,
            rows.len()
        )));
    }

    let report = RefreshReport {
        model_version,
        users,
        rows_written,
        processing_time_ms: start.elapsed().as_millis(),
    };

    tracing::info!(
        store = store.name(),
        model_version = %model_version,
        users = report.users,
        rows = report.rows_written,
        processing_time_ms = report.processing_time_ms,
        "Recommendations refreshed"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::edge_store::MockEdgeStore;
    use crate::models::Edge;
    use crate::services::evaluator::Metric;

    fn community_edges() -> EdgeSet {
        vec![
            Edge::positive(1, 10),
            Edge::positive(2, 10),
            Edge::positive(1, 11),
            Edge::positive(3, 11),
            Edge::positive(4, 20),
            Edge::positive(5, 20),
            Edge::positive(4, 21),
            Edge::positive(6, 21),
        ]
        .into()
    }

    fn small_params() -> AlsParams {
        AlsParams {
            rank: 3,
            ..AlsParams::default()
        }
    }

    #[tokio::test]
    async fn test_train_from_store() {
        let mut store = MockEdgeStore::new();
        store
            .expect_fetch_edges()
            .times(1)
            .returning(|| Ok(community_edges()));
        store.expect_name().return_const("mock");

        let snapshot = train_from_store(
            Arc::new(store),
            Arc::new(ExecutionContext::new("test")),
            small_params(),
        )
        .await
        .unwrap();

        assert_eq!(snapshot.edges.len(), 8);
        assert_eq!(snapshot.known.len(), 8);
        assert_eq!(snapshot.model.user_factors().len(), 4);
    }

    #[tokio::test]
    async fn test_train_from_empty_store_fails() {
        let mut store = MockEdgeStore::new();
        store
            .expect_fetch_edges()
            .returning(|| Ok(EdgeSet::new()));
        store.expect_name().return_const("mock");

        let result = train_from_store(
            Arc::new(store),
            Arc::new(ExecutionContext::new("test")),
            small_params(),
        )
        .await;

        assert!(matches!(result, Err(AppError::Training(_))));
    }

    #[test]
    fn test_evaluate_model_reports_counts() {
        let ctx = ExecutionContext::new("test");
        let edges = community_edges();
        let model = ModelTrainer::new(&ctx, small_params()).fit(&edges).unwrap();

        let report = evaluate_model(
            &ctx,
            &model,
            &edges,
            SamplingConfig::default(),
            Evaluator::new(Metric::Rmse, true),
        )
        .unwrap();

        assert_eq!(report.metric, "rmse");
        assert_eq!(report.positives, 8);
        assert_eq!(report.negatives, 8);
        assert_eq!(report.scored, 16);
        assert_eq!(report.filtered_out, 0);
        assert!(report.value.is_finite());
    }

    #[test]
    fn test_evaluate_model_counts_only_positive_inputs() {
        let ctx = ExecutionContext::new("test");
        let mut edges = community_edges();
        edges.push(Edge::negative(3, 10));
        let model = ModelTrainer::new(&ctx, small_params()).fit(&edges).unwrap();

        let report = evaluate_model(
            &ctx,
            &model,
            &edges,
            SamplingConfig {
                n_new_combos: Some(4),
                ..SamplingConfig::default()
            },
            Evaluator::new(Metric::Mae, true),
        )
        .unwrap();

        assert_eq!(report.positives, 8);
        assert_eq!(report.negatives, 4);
        assert_eq!(report.scored, 13);
    }

    #[test]
    fn test_evaluate_model_surfaces_synthesis_errors() {
        let ctx = ExecutionContext::new("test");
        let edges: EdgeSet = vec![Edge::positive(1, 10), Edge::positive(2, 10)].into();
        let model = ModelTrainer::new(&ctx, small_params()).fit(&edges).unwrap();

        let result = evaluate_model(
            &ctx,
            &model,
            &edges,
            SamplingConfig::default(),
            Evaluator::default(),
        );

        assert!(matches!(result, Err(AppError::Synthesis(_))));
    }

    #[tokio::test]
    async fn test_refresh_saves_rows_without_known_edges() {
        let ctx = ExecutionContext::new("test");
        let edges = community_edges();
        let model = ModelTrainer::new(&ctx, small_params()).fit(&edges).unwrap();
        let snapshot = TrainedSnapshot::new(model, edges);
        let known = snapshot.known.clone();

        let mut store = MockEdgeStore::new();
        store
            .expect_save_recommendations()
            .times(1)
            .withf(move |rows| {
                !rows.is_empty()
                    && rows
                        .iter()
                        .all(|r| !known.contains(r.item_song_id, r.user_song_id))
            })
            .returning(|rows| Ok(rows.len() as u64));
        store.expect_name().return_const("mock");

        let report = refresh_recommendations(
            Arc::new(store),
            snapshot,
            RecommendationService::default(),
            2,
        )
        .await
        .unwrap();

        assert_eq!(report.users, 4);
        assert!(report.rows_written <= 8);
    }
}
