use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    config::Config,
    context::ExecutionContext,
    db::{Cache, EdgeStore},
    error::{AppError, AppResult},
    services::TrainedSnapshot,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EdgeStore>,
    pub context: Arc<ExecutionContext>,
    pub config: Arc<Config>,
    pub cache: Option<Cache>,
    snapshot: Arc<RwLock<Option<TrainedSnapshot>>>,
}

impl AppState {
    /// Creates state with no model installed and caching disabled
    pub fn new(store: Arc<dyn EdgeStore>, context: ExecutionContext, config: Config) -> Self {
        Self {
            store,
            context: Arc::new(context),
            config: Arc::new(config),
            cache: None,
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The installed model and its known edges
    pub async fn snapshot(&self) -> AppResult<TrainedSnapshot> {
        self.snapshot
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::NotFound("No model has been trained yet".to_string()))
    }

    /// Replaces the installed model
    pub async fn install(&self, snapshot: TrainedSnapshot) {
        let mut current = self.snapshot.write().await;
        *current = Some(snapshot);
    }
}
