use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single ranked candidate for a user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item_id: i64,
    pub score: f32,
}

impl Recommendation {
    pub fn new(item_id: i64, score: f32) -> Self {
        Self { item_id, score }
    }

    /// Ranking order: descending score, ties broken by ascending item id
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.item_id.cmp(&other.item_id))
    }
}

/// Top-N recommendations for one user, highest score first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub user_id: i64,
    pub recommendations: Vec<Recommendation>,
}

impl RecommendationBatch {
    pub fn new(user_id: i64, recommendations: Vec<Recommendation>) -> Self {
        Self {
            user_id,
            recommendations,
        }
    }

    pub fn len(&self) -> usize {
        self.recommendations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }

    pub fn item_ids(&self) -> Vec<i64> {
        self.recommendations.iter().map(|r| r.item_id).collect()
    }
}

/// One row of the persisted recommendation table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecommendationRow {
    pub user_song_id: i64,
    pub item_song_id: i64,
    pub rating: f32,
}

impl RecommendationRow {
    pub fn from_batch(batch: &RecommendationBatch) -> impl Iterator<Item = RecommendationRow> + '_ {
        batch.recommendations.iter().map(|r| RecommendationRow {
            user_song_id: batch.user_id,
            item_song_id: r.item_id,
            rating: r.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_cmp_orders_by_score_then_item() {
        let mut recs = vec![
            Recommendation::new(4, 0.5),
            Recommendation::new(2, 0.9),
            Recommendation::new(1, 0.5),
        ];
        recs.sort_by(Recommendation::rank_cmp);

        let ids: Vec<i64> = recs.iter().map(|r| r.item_id).collect();
        assert_eq!(ids, vec![2, 1, 4]);
    }

    #[test]
    fn test_rows_from_batch() {
        let batch = RecommendationBatch::new(
            10,
            vec![Recommendation::new(5, 0.5), Recommendation::new(6, 0.25)],
        );
        let rows: Vec<RecommendationRow> = RecommendationRow::from_batch(&batch).collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_song_id, 10);
        assert_eq!(rows[0].item_song_id, 5);
        assert_eq!(rows[1].rating, 0.25);
    }
}
