use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::models::{EdgeSet, LabelError};
use crate::services::model::{FittedModel, LatentFactors};

const NNLS_MAX_SWEEPS: usize = 200;
const NNLS_TOLERANCE: f64 = 1e-9;

/// Error types for model fitting
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("cannot fit a model on an empty edge set")]
    EmptyEdgeSet,
    #[error("{role} id {id} is not a non-negative 32-bit integer")]
    InvalidId { role: &'static str, id: i64 },
    #[error("invalid training labels: {0}")]
    InvalidLabels(#[from] LabelError),
    #[error("invalid hyperparameters: {0}")]
    InvalidParams(String),
    #[error("normal equations for {role} {id} are not positive definite")]
    NotPositiveDefinite { role: &'static str, id: i64 },
}

/// ALS hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlsParams {
    /// Factor dimensionality
    pub rank: usize,
    /// L2 penalty, scaled per row by its number of observations
    pub regularization: f64,
    /// Implicit confidence scaling
    pub alpha: f64,
    /// Constrain factors to be >= 0
    pub non_negative: bool,
    /// Treat labels as confidence instead of ratings
    pub implicit: bool,
    pub max_iter: usize,
    /// Seed for factor initialisation
    pub seed: u64,
}

impl Default for AlsParams {
    fn default() -> Self {
        Self {
            rank: 10,
            regularization: 0.01,
            alpha: 1.0,
            non_negative: true,
            implicit: true,
            max_iter: 10,
            seed: 42,
        }
    }
}

impl AlsParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.rank == 0 {
            return Err(TrainingError::InvalidParams("rank must be at least 1".to_string()));
        }
        if self.max_iter == 0 {
            return Err(TrainingError::InvalidParams(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(TrainingError::InvalidParams(format!(
                "regularization must be finite and >= 0, got {}",
                self.regularization
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(TrainingError::InvalidParams(format!(
                "alpha must be finite and >= 0, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Observations of one row, as (column index, label)
type Observations = Vec<Vec<(usize, f32)>>;

/// Fits an alternating-least-squares factorization over an edge set
pub struct ModelTrainer<'a> {
    ctx: &'a ExecutionContext,
    params: AlsParams,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(ctx: &'a ExecutionContext, params: AlsParams) -> Self {
        Self { ctx, params }
    }

    pub fn params(&self) -> &AlsParams {
        &self.params
    }

    /// Learns item and user factors from `edges`
    ///
    /// Deterministic for a fixed `seed`. Blocks until every iteration is done.
    pub fn fit(&self, edges: &EdgeSet) -> Result<FittedModel, TrainingError> {
        let _span = self.ctx.span("fit").entered();
        let start = Instant::now();

        self.params.validate()?;
        if edges.is_empty() {
            return Err(TrainingError::EmptyEdgeSet);
        }
        for edge in edges {
            check_id("item", edge.item_id)?;
            check_id("user", edge.user_id)?;
        }
        edges.check_labels()?;

        let item_ids = edges.distinct_items();
        let user_ids = edges.distinct_users();
        let item_index: HashMap<i64, usize> =
            item_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let user_index: HashMap<i64, usize> =
            user_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut by_user: Observations = vec![Vec::new(); user_ids.len()];
        let mut by_item: Observations = vec![Vec::new(); item_ids.len()];
        for edge in edges {
            let item = item_index[&edge.item_id];
            let user = user_index[&edge.user_id];
            by_user[user].push((item, edge.label as f32));
            by_item[item].push((user, edge.label as f32));
        }

        tracing::info!(
            edges = edges.len(),
            items = item_ids.len(),
            users = user_ids.len(),
            rank = self.params.rank,
            implicit = self.params.implicit,
            "Fitting ALS model"
        );

        let mut rng = self.ctx.seeded_rng(self.params.seed);
        let mut item_factors = init_factors(&mut rng, item_ids.len(), self.params.rank);
        let mut user_factors = init_factors(&mut rng, user_ids.len(), self.params.rank);

        for iteration in 0..self.params.max_iter {
            item_factors = self.solve_factors(&user_factors, &by_item, &item_ids, "item")?;
            user_factors = self.solve_factors(&item_factors, &by_user, &user_ids, "user")?;

            if tracing::enabled!(tracing::Level::DEBUG) {
                let loss = squared_error(&by_user, &user_factors, &item_factors);
                tracing::debug!(iteration, loss, "ALS iteration finished");
            }
        }

        tracing::info!(
            processing_time_ms = start.elapsed().as_millis(),
            "ALS model fitted"
        );

        Ok(FittedModel::new(
            self.params.clone(),
            edges.len(),
            LatentFactors::new(item_ids, item_factors),
            LatentFactors::new(user_ids, user_factors),
        ))
    }

    /// Solves every row of one side while the other side is held fixed
    fn solve_factors(
        &self,
        fixed: &Array2<f32>,
        observations: &Observations,
        ids: &[i64],
        role: &'static str,
    ) -> Result<Array2<f32>, TrainingError> {
        let k = self.params.rank;
        let fixed = fixed.mapv(f64::from);
        let gram = if self.params.implicit {
            fixed.t().dot(&fixed)
        } else {
            Array2::zeros((k, k))
        };

        let mut solved = Array2::<f32>::zeros((observations.len(), k));

        for (row, entries) in observations.iter().enumerate() {
            let mut a = gram.clone();
            let mut b = Array1::<f64>::zeros(k);
            let mut n_explicit = 0usize;

            for &(col, label) in entries {
                let y = fixed.row(col);
                let label = f64::from(label);

                if self.params.implicit {
                    let c1 = self.params.alpha * label.abs();
                    add_outer(&mut a, &y.to_owned(), c1);
                    if label > 0.0 {
                        n_explicit += 1;
                        b.scaled_add(1.0 + c1, &y);
                    }
                } else {
                    n_explicit += 1;
                    add_outer(&mut a, &y.to_owned(), 1.0);
                    b.scaled_add(label, &y);
                }
            }

            let reg = self.params.regularization * n_explicit.max(1) as f64;
            for i in 0..k {
                a[[i, i]] += reg;
            }

            let x = if self.params.non_negative {
                solve_non_negative(&a, &b)
            } else {
                cholesky_solve(&a, &b)
                    .ok_or(TrainingError::NotPositiveDefinite { role, id: ids[row] })?
            };

            solved.row_mut(row).assign(&x.mapv(|v| v as f32));
        }

        Ok(solved)
    }
}

fn check_id(role: &'static str, id: i64) -> Result<(), TrainingError> {
    if id < 0 || id > i64::from(i32::MAX) {
        return Err(TrainingError::InvalidId { role, id });
    }
    Ok(())
}

/// Non-negative random rows of unit length
fn init_factors(rng: &mut impl Rng, rows: usize, rank: usize) -> Array2<f32> {
    let mut factors = Array2::from_shape_fn((rows, rank), |_| rng.gen::<f32>());
    for mut row in factors.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    factors
}

/// a += c * y yᵀ
fn add_outer(a: &mut Array2<f64>, y: &Array1<f64>, c: f64) {
    if c == 0.0 {
        return;
    }
    let k = y.len();
    for i in 0..k {
        for j in 0..k {
            a[[i, j]] += c * y[i] * y[j];
        }
    }
}

/// Solves A x = b for symmetric positive definite A
///
/// Returns `None` if A is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Lᵀ x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Minimises ½xᵀAx − bᵀx subject to x ≥ 0 by projected coordinate descent
fn solve_non_negative(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let k = b.len();
    let mut x = Array1::<f64>::zeros(k);

    for _ in 0..NNLS_MAX_SWEEPS {
        let mut max_delta = 0.0f64;
        for i in 0..k {
            let diag = a[[i, i]];
            if diag <= 0.0 {
                continue;
            }
            let gradient = a.row(i).dot(&x) - b[i];
            let updated = (x[i] - gradient / diag).max(0.0);
            max_delta = max_delta.max((updated - x[i]).abs());
            x[i] = updated;
        }
        if max_delta < NNLS_TOLERANCE {
            break;
        }
    }

    x
}

/// Mean squared reconstruction error over observed entries
fn squared_error(by_user: &Observations, users: &Array2<f32>, items: &Array2<f32>) -> f64 {
    let mut total = 0.0f64;
    let mut count = 0usize;
    for (user, entries) in by_user.iter().enumerate() {
        for &(item, label) in entries {
            let prediction = users.row(user).dot(&items.row(item));
            total += f64::from(label - prediction).powi(2);
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
