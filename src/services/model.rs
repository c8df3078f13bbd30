use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{EdgeSet, ModelSummary, Prediction, Recommendation};
use crate::services::trainer::AlsParams;

/// Ranked candidates for one user, best first
pub type UserRanking = (i64, Vec<Recommendation>);

/// Ranking capability a fitted model must provide to the recommendation service
///
/// Per-user lists are ordered by descending score with ties broken by
/// ascending item id, and hold at most `k` candidates.
pub trait RankingModel: Send + Sync {
    /// Top `k` candidates for each requested user the model knows about
    ///
    /// Users without latent factors are omitted from the result.
    fn recommend_for_users(&self, user_ids: &[i64], k: usize) -> Vec<UserRanking>;

    /// Top `k` candidates for every user, one user at a time
    fn recommend_for_all_users(&self, k: usize) -> Box<dyn Iterator<Item = UserRanking> + '_>;
}

/// Learned vectors for one id role
#[derive(Debug, Clone)]
pub struct LatentFactors {
    ids: Vec<i64>,
    index: HashMap<i64, usize>,
    factors: Array2<f32>,
}

impl LatentFactors {
    /// Row `i` of `factors` belongs to `ids[i]`
    pub(crate) fn new(ids: Vec<i64>, factors: Array2<f32>) -> Self {
        debug_assert_eq!(ids.len(), factors.nrows());
        let index = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        Self {
            ids,
            index,
            factors,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn rank(&self) -> usize {
        self.factors.ncols()
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn vector(&self, id: i64) -> Option<ArrayView1<'_, f32>> {
        self.index.get(&id).map(|&row| self.factors.row(row))
    }

    pub fn matrix(&self) -> &Array2<f32> {
        &self.factors
    }
}

/// Output of `ModelTrainer::fit`
///
/// Immutable once built; a re-fit produces a new model with a new version.
#[derive(Debug, Clone)]
pub struct FittedModel {
    version: Uuid,
    trained_at: DateTime<Utc>,
    params: AlsParams,
    training_edges: usize,
    item_factors: LatentFactors,
    user_factors: LatentFactors,
}

impl FittedModel {
    pub(crate) fn new(
        params: AlsParams,
        training_edges: usize,
        item_factors: LatentFactors,
        user_factors: LatentFactors,
    ) -> Self {
        Self {
            version: Uuid::new_v4(),
            trained_at: Utc::now(),
            params,
            training_edges,
            item_factors,
            user_factors,
        }
    }

    pub fn version(&self) -> Uuid {
        self.version
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn params(&self) -> &AlsParams {
        &self.params
    }

    pub fn item_factors(&self) -> &LatentFactors {
        &self.item_factors
    }

    pub fn user_factors(&self) -> &LatentFactors {
        &self.user_factors
    }

    /// Score for one pair, `None` if either id was not seen in training
    pub fn predict(&self, item_id: i64, user_id: i64) -> Option<f32> {
        let item = self.item_factors.vector(item_id)?;
        let user = self.user_factors.vector(user_id)?;
        Some(item.dot(&user))
    }

    /// Scores every edge; unseen ids yield NaN
    pub fn transform(&self, edges: &EdgeSet) -> Vec<Prediction> {
        edges
            .iter()
            .map(|edge| Prediction {
                item_id: edge.item_id,
                user_id: edge.user_id,
                label: edge.label,
                prediction: self.predict(edge.item_id, edge.user_id).unwrap_or(f32::NAN),
            })
            .collect()
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            version: self.version,
            trained_at: self.trained_at,
            rank: self.params.rank,
            items: self.item_factors.len(),
            users: self.user_factors.len(),
            training_edges: self.training_edges,
        }
    }

    fn top_k(&self, user_vector: ArrayView1<'_, f32>, k: usize) -> Vec<Recommendation> {
        let scores = self.item_factors.matrix().dot(&user_vector);
        let mut candidates: Vec<Recommendation> = self
            .item_factors
            .ids()
            .iter()
            .zip(scores.iter())
            .map(|(&item_id, &score)| Recommendation::new(item_id, score))
            .collect();

        if k < candidates.len() {
            candidates.select_nth_unstable_by(k, Recommendation::rank_cmp);
            candidates.truncate(k);
        }
        candidates.sort_by(Recommendation::rank_cmp);
        candidates
    }
}

impl RankingModel for FittedModel {
    fn recommend_for_users(&self, user_ids: &[i64], k: usize) -> Vec<UserRanking> {
        user_ids
            .iter()
            .filter_map(|&user_id| {
                self.user_factors
                    .vector(user_id)
                    .map(|vector| (user_id, self.top_k(vector, k)))
            })
            .collect()
    }

    fn recommend_for_all_users(&self, k: usize) -> Box<dyn Iterator<Item = UserRanking> + '_> {
        Box::new(
            self.user_factors
                .ids()
                .iter()
                .zip(self.user_factors.matrix().rows())
                .map(move |(&user_id, vector)| (user_id, self.top_k(vector, k))),
        )
    }
}
