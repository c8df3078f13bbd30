use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::models::{Edge, EdgeSet, LabelError};

/// Error types for negative sample synthesis
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("need at least 2 distinct {axis} ids to synthesize negatives, found {distinct}")]
    DegenerateIdSpace { axis: &'static str, distinct: usize },
    #[error("cannot draw {requested} new pairs: only {available} unlabelled pairs exist")]
    Infeasible { requested: usize, available: usize },
    #[error("gave up after {attempts} rejected draws with {drawn} of {requested} negatives found")]
    Exhausted {
        requested: usize,
        drawn: usize,
        attempts: u64,
    },
    #[error("invalid input labels: {0}")]
    InvalidLabels(#[from] LabelError),
    #[error("invalid sampling configuration: {0}")]
    InvalidConfig(String),
}

/// Switches for negative sample synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Enumerate every unlabelled pair instead of sampling
    pub get_all: bool,
    /// Negatives to draw in random mode; defaults to the input edge count
    pub n_new_combos: Option<usize>,
    pub seed: u64,
    /// Item ids per exhaustive batch
    pub batch_size: usize,
    /// Consecutive rejections tolerated for one random draw
    pub max_attempts_per_draw: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            get_all: false,
            n_new_combos: None,
            seed: 216,
            batch_size: 500,
            max_attempts_per_draw: 100_000,
        }
    }
}

/// Manufactures label-0 edges so a model fitted on positives can be scored
pub struct NegativeSampleSynthesizer<'a> {
    ctx: &'a ExecutionContext,
    config: SamplingConfig,
}

impl<'a> NegativeSampleSynthesizer<'a> {
    pub fn new(ctx: &'a ExecutionContext, config: SamplingConfig) -> Self {
        Self { ctx, config }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Returns the input edges followed by the synthesized negatives
    ///
    /// Either the whole synthesis succeeds or nothing is returned.
    pub fn synthesize(&self, edges: &EdgeSet) -> Result<EdgeSet, SynthesisError> {
        let _span = self.ctx.span("synthesize").entered();
        let start = Instant::now();

        edges.check_labels()?;
        let items = edges.distinct_items();
        let users = edges.distinct_users();
        if items.len() < 2 {
            return Err(SynthesisError::DegenerateIdSpace {
                axis: "item",
                distinct: items.len(),
            });
        }
        if users.len() < 2 {
            return Err(SynthesisError::DegenerateIdSpace {
                axis: "user",
                distinct: users.len(),
            });
        }

        let negatives = if self.config.get_all {
            self.all_negatives(edges, &items, &users)?
        } else {
            self.random_negatives(edges, &items, &users)?
        };

        tracing::info!(
            input = edges.len(),
            negatives = negatives.len(),
            exhaustive = self.config.get_all,
            processing_time_ms = start.elapsed().as_millis(),
            "Negative samples synthesized"
        );

        let mut combined = EdgeSet::with_capacity(edges.len() + negatives.len());
        combined.append(edges.as_slice().to_vec());
        combined.append(negatives);
        Ok(combined)
    }

    /// Every (item, user) pair of the cross-product that is not already labelled
    ///
    /// Walks the items in first-seen order, `batch_size` at a time.
    fn all_negatives(
        &self,
        edges: &EdgeSet,
        items: &[i64],
        users: &[i64],
    ) -> Result<Vec<Edge>, SynthesisError> {
        if self.config.batch_size == 0 {
            return Err(SynthesisError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let existing = edges.pairs();
        let mut accumulated = Vec::new();
        let mut processed = 0usize;

        for (batch_index, batch) in items.chunks(self.config.batch_size).enumerate() {
            let batch_negatives: Vec<Edge> = batch
                .iter()
                .flat_map(|&item| users.iter().map(move |&user| (item, user)))
                .filter(|pair| !existing.contains(pair))
                .map(|(item, user)| Edge::negative(item, user))
                .collect();

            processed += batch.len();
            tracing::debug!(
                batch = batch_index,
                items_processed = processed,
                items_total = items.len(),
                batch_negatives = batch_negatives.len(),
                "Exhaustive negative batch complete"
            );

            accumulated.extend(batch_negatives);
        }

        Ok(accumulated)
    }

    /// Uniform draws with replacement, rejected while the pair is already labelled
    fn random_negatives(
        &self,
        edges: &EdgeSet,
        items: &[i64],
        users: &[i64],
    ) -> Result<Vec<Edge>, SynthesisError> {
        let requested = self.config.n_new_combos.unwrap_or(edges.len());
        let mut seen = edges.pairs();

        let available = (items.len() * users.len()).saturating_sub(seen.len());
        if requested > available {
            return Err(SynthesisError::Infeasible {
                requested,
                available,
            });
        }

        let mut rng = self.ctx.seeded_rng(self.config.seed);
        let mut drawn = Vec::with_capacity(requested);

        while drawn.len() < requested {
            let pair = self.draw_unseen(&mut rng, items, users, &seen).ok_or(
                SynthesisError::Exhausted {
                    requested,
                    drawn: drawn.len(),
                    attempts: self.config.max_attempts_per_draw,
                },
            )?;
            seen.insert(pair);
            drawn.push(Edge::negative(pair.0, pair.1));
        }

        Ok(drawn)
    }

    fn draw_unseen(
        &self,
        rng: &mut impl Rng,
        items: &[i64],
        users: &[i64],
        seen: &HashSet<(i64, i64)>,
    ) -> Option<(i64, i64)> {
        for _ in 0..self.config.max_attempts_per_draw {
            let item = items[rng.gen_range(0..items.len())];
            let user = users[rng.gen_range(0..users.len())];
            if !seen.contains(&(item, user)) {
                return Some((item, user));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star_graph() -> EdgeSet {
        vec![
            Edge::positive(1, 10),
            Edge::positive(2, 10),
            Edge::positive(3, 20),
            Edge::positive(1, 30),
        ]
        .into()
    }

    fn exhaustive(batch_size: usize) -> SamplingConfig {
        SamplingConfig {
            get_all: true,
            batch_size,
            ..SamplingConfig::default()
        }
    }

    #[test]
    fn test_degenerate_item_axis() {
        let ctx = ExecutionContext::new("test");
        let edges: EdgeSet = vec![Edge::positive(1, 10), Edge::positive(1, 20)].into();
        let result = NegativeSampleSynthesizer::new(&ctx, SamplingConfig::default()).synthesize(&edges);

        assert!(matches!(
            result,
            Err(SynthesisError::DegenerateIdSpace { axis: "item", distinct: 1 })
        ));
    }

    #[test]
    fn test_degenerate_user_axis() {
        let ctx = ExecutionContext::new("test");
        let edges: EdgeSet = vec![Edge::positive(1, 10), Edge::positive(2, 10)].into();
        let result = NegativeSampleSynthesizer::new(&ctx, exhaustive(500)).synthesize(&edges);

        assert!(matches!(
            result,
            Err(SynthesisError::DegenerateIdSpace { axis: "user", distinct: 1 })
        ));
    }

    #[test]
    fn test_conflicting_input_labels_rejected() {
        let ctx = ExecutionContext::new("test");
        let edges: EdgeSet = vec![
            Edge::positive(1, 10),
            Edge::negative(1, 10),
            Edge::positive(2, 20),
        ]
        .into();

        let result = NegativeSampleSynthesizer::new(&ctx, exhaustive(500)).synthesize(&edges);
        assert!(matches!(
            result,
            Err(SynthesisError::InvalidLabels(LabelError::Conflicting {
                item_id: 1,
                user_id: 10
            }))
        ));
    }

    #[test]
    fn test_out_of_range_input_label_rejected() {
        let ctx = ExecutionContext::new("test");
        let mut edges = star_graph();
        edges.push(Edge::new(2, 30, 2));

        let result = NegativeSampleSynthesizer::new(&ctx, SamplingConfig::default()).synthesize(&edges);
        assert!(matches!(
            result,
            Err(SynthesisError::InvalidLabels(LabelError::OutOfRange { label: 2, .. }))
        ));
    }

    #[test]
    fn test_exhaustive_complements_the_cross_product() {
        let ctx = ExecutionContext::new("test");
        let edges = star_graph();
        let result = NegativeSampleSynthesizer::new(&ctx, exhaustive(500))
            .synthesize(&edges)
            .unwrap();

        // 3 items x 3 users, 4 of them positive
        assert_eq!(result.len(), 9);
        assert_eq!(&result.as_slice()[..4], edges.as_slice());

        let negatives: Vec<(i64, i64)> = result.as_slice()[4..].iter().map(Edge::pair).collect();
        assert_eq!(negatives, vec![(1, 20), (2, 20), (2, 30), (3, 10), (3, 30)]);
        assert!(result.as_slice()[4..].iter().all(|e| e.label == 0));
    }

    #[test]
    fn test_exhaustive_batching_does_not_change_output() {
        let ctx = ExecutionContext::new("test");
        let edges = star_graph();

        let whole = NegativeSampleSynthesizer::new(&ctx, exhaustive(500))
            .synthesize(&edges)
            .unwrap();
        let batched = NegativeSampleSynthesizer::new(&ctx, exhaustive(1))
            .synthesize(&edges)
            .unwrap();

        assert_eq!(whole, batched);
    }

    #[test]
    fn test_exhaustive_rejects_zero_batch() {
        let ctx = ExecutionContext::new("test");
        let result = NegativeSampleSynthesizer::new(&ctx, exhaustive(0)).synthesize(&star_graph());
        assert!(matches!(result, Err(SynthesisError::InvalidConfig(_))));
    }

    #[test]
    fn test_random_defaults_to_input_size() {
        let ctx = ExecutionContext::new("test");
        let edges = star_graph();
        let result = NegativeSampleSynthesizer::new(&ctx, SamplingConfig::default())
            .synthesize(&edges)
            .unwrap();

        assert_eq!(result.len(), 8);
        assert_eq!(result.positive_count(), 4);
    }

    #[test]
    fn test_random_never_repeats_or_hits_positives() {
        let ctx = ExecutionContext::new("test");
        let edges = star_graph();
        let config = SamplingConfig {
            n_new_combos: Some(5),
            ..SamplingConfig::default()
        };
        let result = NegativeSampleSynthesizer::new(&ctx, config)
            .synthesize(&edges)
            .unwrap();

        // 5 is every remaining pair of the 3x3 grid
        assert_eq!(result.pairs().len(), 9);
        assert_eq!(result.len(), 9);
    }

    #[test]
    fn test_random_is_reproducible_for_a_seed() {
        let ctx = ExecutionContext::new("test");
        let edges: EdgeSet = (0..20).map(|i| Edge::positive(i, (i * 7) % 13)).collect();
        let config = SamplingConfig {
            n_new_combos: Some(15),
            seed: 99,
            ..SamplingConfig::default()
        };

        let first = NegativeSampleSynthesizer::new(&ctx, config.clone())
            .synthesize(&edges)
            .unwrap();
        let second = NegativeSampleSynthesizer::new(&ctx, config)
            .synthesize(&edges)
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_random_rejects_infeasible_request() {
        let ctx = ExecutionContext::new("test");
        let config = SamplingConfig {
            n_new_combos: Some(6),
            ..SamplingConfig::default()
        };
        let result = NegativeSampleSynthesizer::new(&ctx, config).synthesize(&star_graph());

        assert!(matches!(
            result,
            Err(SynthesisError::Infeasible { requested: 6, available: 5 })
        ));
    }

    #[test]
    fn test_random_gives_up_after_attempt_cap() {
        let ctx = ExecutionContext::new("test");
        let config = SamplingConfig {
            n_new_combos: Some(5),
            max_attempts_per_draw: 0,
            ..SamplingConfig::default()
        };
        let result = NegativeSampleSynthesizer::new(&ctx, config).synthesize(&star_graph());

        assert!(matches!(
            result,
            Err(SynthesisError::Exhausted { requested: 5, drawn: 0, .. })
        ));
    }
}
