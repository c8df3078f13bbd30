use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use uuid::Uuid;

/// Users between two progress log lines in all-user recommendation passes
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10_000;

/// Process-wide execution context
///
/// Created once at start-up and handed by reference to the trainer and the
/// negative sampler. Holds no mutable state: every randomised operation asks
/// for its own seeded generator.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    app_name: String,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    progress_interval: usize,
}

impl ExecutionContext {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Overrides how often long loops report progress
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn progress_interval(&self) -> usize {
        self.progress_interval
    }

    /// Deterministic generator for the given seed
    pub fn seeded_rng(&self, seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// Span tagging an engine operation with this run
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "engine",
            app = %self.app_name,
            run_id = %self.run_id,
            operation = operation,
        )
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let ctx = ExecutionContext::new("test");
        let mut first = ctx.seeded_rng(7);
        let mut second = ctx.seeded_rng(7);

        let a: Vec<u32> = (0..5).map(|_| first.gen()).collect();
        let b: Vec<u32> = (0..5).map(|_| second.gen()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_progress_interval_never_zero() {
        let ctx = ExecutionContext::new("test").with_progress_interval(0);
        assert_eq!(ctx.progress_interval(), 1);
    }
}
