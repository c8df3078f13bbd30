use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use crate::models::Prediction;

/// Error types for scoring predictions
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("no scorable predictions ({filtered_out} filtered out as invalid)")]
    NoScorablePredictions { filtered_out: usize },
    #[error("r2 is undefined when every scored label is the same")]
    ConstantLabels,
    #[error("unknown metric '{0}', expected one of rmse, mse, mae, r2")]
    UnknownMetric(String),
}

/// Regression metrics comparing `prediction` with `label`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Rmse,
    Mse,
    Mae,
    R2,
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Rmse => write!(f, "rmse"),
            Metric::Mse => write!(f, "mse"),
            Metric::Mae => write!(f, "mae"),
            Metric::R2 => write!(f, "r2"),
        }
    }
}

impl FromStr for Metric {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rmse" => Ok(Metric::Rmse),
            "mse" => Ok(Metric::Mse),
            "mae" => Ok(Metric::Mae),
            "r2" => Ok(Metric::R2),
            _ => Err(EvaluationError::UnknownMetric(s.to_string())),
        }
    }
}

/// Scored outcome, with how many predictions were dropped before scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub value: f64,
    pub scored: usize,
    pub filtered_out: usize,
}

/// Scores a model's predictions against their labels
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    metric: Metric,
    filter_invalid: bool,
}

impl Evaluator {
    pub fn new(metric: Metric, filter_invalid: bool) -> Self {
        Self {
            metric,
            filter_invalid,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Metric value over `predictions`
    ///
    /// With `filter_invalid`, NaN predictions are dropped first. Without it a
    /// single NaN makes the result NaN.
    pub fn score(&self, predictions: &[Prediction]) -> Result<f64, EvaluationError> {
        self.evaluate(predictions).map(|score| score.value)
    }

    pub fn evaluate(&self, predictions: &[Prediction]) -> Result<Score, EvaluationError> {
        let pairs: Vec<(f64, f64)> = predictions
            .iter()
            .filter(|p| !self.filter_invalid || p.is_valid())
            .map(|p| (f64::from(p.label), f64::from(p.prediction)))
            .collect();

        let filtered_out = predictions.len() - pairs.len();
        if pairs.is_empty() {
            return Err(EvaluationError::NoScorablePredictions { filtered_out });
        }

        let n = pairs.len() as f64;
        let value = match self.metric {
            Metric::Mse => squared_error_sum(&pairs) / n,
            Metric::Rmse => (squared_error_sum(&pairs) / n).sqrt(),
            Metric::Mae => pairs.iter().map(|(l, p)| (l - p).abs()).sum::<f64>() / n,
            Metric::R2 => {
                let mean = pairs.iter().map(|(l, _)| l).sum::<f64>() / n;
                let total: f64 = pairs.iter().map(|(l, _)| (l - mean).powi(2)).sum();
                if total == 0.0 {
                    return Err(EvaluationError::ConstantLabels);
                }
                1.0 - squared_error_sum(&pairs) / total
            }
        };

        Ok(Score {
            value,
            scored: pairs.len(),
            filtered_out,
        })
    }
}

fn squared_error_sum(pairs: &[(f64, f64)]) -> f64 {
    pairs.iter().map(|(l, p)| (l - p).powi(2)).sum()
}

/// Convenience wrapper over `Evaluator::score`
pub fn score(
    predictions: &[Prediction],
    metric: Metric,
    filter_invalid: bool,
) -> Result<f64, EvaluationError> {
    Evaluator::new(metric, filter_invalid).score(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(label: i32, value: f32) -> Prediction {
        Prediction {
            item_id: 1,
            user_id: 2,
            label,
            prediction: value,
        }
    }

    fn four_valid_one_nan() -> Vec<Prediction> {
        vec![
            prediction(1, 1.0),
            prediction(0, 0.5),
            prediction(1, f32::NAN),
            prediction(1, 0.5),
            prediction(0, 0.0),
        ]
    }

    #[test]
    fn test_filter_invalid_scores_only_numeric_values() {
        let result = Evaluator::new(Metric::Mse, true)
            .evaluate(&four_valid_one_nan())
            .unwrap();

        // squared errors 0, 0.25, 0.25, 0 over 4 rows
        assert_eq!(result.scored, 4);
        assert_eq!(result.filtered_out, 1);
        assert!((result.value - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_nan_propagates_without_filter() {
        let value = score(&four_valid_one_nan(), Metric::Rmse, false).unwrap();
        assert!(value.is_nan());
    }

    #[test]
    fn test_rmse() {
        let preds = vec![prediction(1, 0.0), prediction(0, 0.0)];
        let value = score(&preds, Metric::Rmse, false).unwrap();
        assert!((value - 0.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mae_and_r2() {
        let preds = vec![prediction(1, 0.5), prediction(0, 0.5)];

        let mae = score(&preds, Metric::Mae, false).unwrap();
        assert!((mae - 0.5).abs() < 1e-12);

        let r2 = score(&preds, Metric::R2, false).unwrap();
        assert!(r2.abs() < 1e-12);
    }

    #[test]
    fn test_r2_with_constant_labels() {
        let preds = vec![prediction(1, 0.9), prediction(1, 0.4)];
        let result = score(&preds, Metric::R2, false);
        assert!(matches!(result, Err(EvaluationError::ConstantLabels)));

        // other metrics are still defined
        assert!(score(&preds, Metric::Rmse, false).is_ok());
    }

    #[test]
    fn test_empty_after_filtering() {
        let preds = vec![prediction(1, f32::NAN)];
        let result = score(&preds, Metric::Rmse, true);
        assert!(matches!(
            result,
            Err(EvaluationError::NoScorablePredictions { filtered_out: 1 })
        ));
    }

    #[test]
    fn test_empty_input() {
        let result = score(&[], Metric::Rmse, false);
        assert!(matches!(
            result,
            Err(EvaluationError::NoScorablePredictions { filtered_out: 0 })
        ));
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("RMSE".parse::<Metric>().unwrap(), Metric::Rmse);
        assert_eq!("r2".parse::<Metric>().unwrap(), Metric::R2);
        assert!(matches!(
            "auc".parse::<Metric>(),
            Err(EvaluationError::UnknownMetric(_))
        ));
        assert_eq!(Metric::Mae.to_string(), "mae");
    }
}
