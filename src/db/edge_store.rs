use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{EdgeSet, RecommendationRow},
};

/// Source of the connection graph and sink for generated recommendations
///
/// The crawler owns the edge table; this core only reads it and replaces the
/// recommendation table wholesale.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EdgeStore: Send + Sync {
    /// Every known `(song_id, sampled_by_song_id)` edge
    async fn fetch_edges(&self) -> AppResult<EdgeSet>;

    /// Replaces all stored recommendations, returning the number of rows written
    async fn save_recommendations(&self, rows: &[RecommendationRow]) -> AppResult<u64>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}

/// Edge store held entirely in memory
#[derive(Default)]
pub struct InMemoryEdgeStore {
    edges: RwLock<EdgeSet>,
    recommendations: RwLock<Vec<RecommendationRow>>,
}

impl InMemoryEdgeStore {
    pub fn new(edges: EdgeSet) -> Self {
        Self {
            edges: RwLock::new(edges),
            recommendations: RwLock::new(Vec::new()),
        }
    }

    /// Rows written by the last `save_recommendations`
    pub async fn recommendations(&self) -> Vec<RecommendationRow> {
        self.recommendations.read().await.clone()
    }
}

#[async_trait::async_trait]
impl EdgeStore for InMemoryEdgeStore {
    async fn fetch_edges(&self) -> AppResult<EdgeSet> {
        Ok(self.edges.read().await.clone())
    }

    async fn save_recommendations(&self, rows: &[RecommendationRow]) -> AppResult<u64> {
        let mut stored = self.recommendations.write().await;
        *stored = rows.to_vec();
        Ok(rows.len() as u64)
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
