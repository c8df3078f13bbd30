use std::collections::BTreeMap;
use std::time::Instant;

use crate::{
    context::DEFAULT_PROGRESS_INTERVAL,
    error::{AppError, AppResult},
    models::{KnownEdges, Recommendation, RecommendationBatch, RecommendationRow},
    services::model::RankingModel,
};

/// Raw candidates requested per recommendation on the single-user path
const SINGLE_OVERFETCH: usize = 2;
/// Raw candidates requested per recommendation on the all-users path
const BATCH_OVERFETCH: usize = 10;

/// Exclusion-aware top-N retrieval
///
/// Never returns an item the user already has a positive edge with.
#[derive(Debug, Clone)]
pub struct RecommendationService {
    progress_interval: usize,
}

impl Default for RecommendationService {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl RecommendationService {
    pub fn new(progress_interval: usize) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
        }
    }

    /// Top `n` unseen items for one user
    ///
    /// Over-fetches `2n` candidates and drops known edges before truncating,
    /// so fewer than `n` may come back.
    pub fn recommend_for_one<M: RankingModel + ?Sized>(
        &self,
        model: &M,
        known: &KnownEdges,
        user_id: i64,
        n: usize,
    ) -> AppResult<RecommendationBatch> {
        let k = fetch_size(n, SINGLE_OVERFETCH)?;

        let (_, candidates) = model
            .recommend_for_users(&[user_id], k)
            .into_iter()
            .find(|(id, _)| *id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("No latent factors for song {}", user_id)))?;

        let mut kept = exclude_known(candidates, known, user_id);
        kept.truncate(n);
        Ok(RecommendationBatch::new(user_id, kept))
    }

    /// Top `n` unseen items for every user the model knows
    ///
    /// Over-fetches `10n` candidates per user. Users whose candidates are all
    /// known get a short (possibly empty) batch.
    pub fn recommend_for_all<M: RankingModel + ?Sized>(
        &self,
        model: &M,
        known: &KnownEdges,
        n: usize,
    ) -> AppResult<BTreeMap<i64, RecommendationBatch>> {
        let k = fetch_size(n, BATCH_OVERFETCH)?;
        let start = Instant::now();

        tracing::info!(
            n,
            candidates_per_user = k,
            known_edges = known.len(),
            "Generating recommendations for all users"
        );

        let mut batches = BTreeMap::new();
        let mut dropped = 0usize;

        for (processed, (user_id, candidates)) in
            model.recommend_for_all_users(k).enumerate()
        {
            if processed % self.progress_interval == 0 {
                tracing::info!(processed, "Recommendation progress");
            }

            let fetched = candidates.len();
            let mut kept = exclude_known(candidates, known, user_id);
            dropped += fetched - kept.len();

            kept.truncate(n);
            batches.insert(user_id, RecommendationBatch::new(user_id, kept));
        }

        tracing::info!(
            users = batches.len(),
            dropped_known = dropped,
            processing_time_ms = start.elapsed().as_millis(),
            "Recommendations generated"
        );

        Ok(batches)
    }

    /// Flattens batches into output rows, grouped by user, best rating first
    pub fn to_rows(batches: &BTreeMap<i64, RecommendationBatch>) -> Vec<RecommendationRow> {
        batches
            .values()
            .flat_map(RecommendationRow::from_batch)
            .collect()
    }
}

/// Validates `n` and returns the number of raw candidates to request
fn fetch_size(n: usize, overfetch: usize) -> AppResult<usize> {
    if n == 0 {
        return Err(AppError::InvalidInput(
            "Number of recommendations must be at least 1".to_string(),
        ));
    }
    n.checked_mul(overfetch).ok_or_else(|| {
        AppError::InvalidInput(format!("Number of recommendations {} is too large", n))
    })
}

/// Drops candidates already connected to `user_id`, keeping their order
fn exclude_known(
    candidates: Vec<Recommendation>,
    known: &KnownEdges,
    user_id: i64,
) -> Vec<Recommendation> {
    candidates
        .into_iter()
        .filter(|r| !known.contains(r.item_id, user_id))
        .collect()
}
