use serde::{Deserialize, Serialize};

pub mod edge;
pub mod recommendation;

pub use edge::{Edge, EdgeSet, KnownEdges, LabelError};
pub use recommendation::{Recommendation, RecommendationBatch, RecommendationRow};

/// Model output for one edge
///
/// `prediction` is NaN when either id was never seen during training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub item_id: i64,
    pub user_id: i64,
    pub label: i32,
    pub prediction: f32,
}

impl Prediction {
    /// True if the prediction holds a usable number
    pub fn is_valid(&self) -> bool {
        !self.prediction.is_nan()
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Summary of the currently installed model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub version: uuid::Uuid,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub rank: usize,
    pub items: usize,
    pub users: usize,
    pub training_edges: usize,
}

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metric: String,
    pub value: f64,
    pub positives: usize,
    pub negatives: usize,
    pub scored: usize,
    pub filtered_out: usize,
    pub processing_time_ms: u128,
}

/// Outcome of regenerating recommendations for every user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    pub model_version: uuid::Uuid,
    pub users: usize,
    pub rows_written: u64,
    pub processing_time_ms: u128,
}
