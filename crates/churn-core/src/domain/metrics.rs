//! Binary classification metrics (positive class = churn = 1).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::error::{ChurnError, Result};

/// Metric used to compare a candidate against the incumbent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetMetric {
    #[serde(rename = "accuracy")]
    Accuracy,
    #[serde(rename = "precision")]
    Precision,
    #[serde(rename = "recall")]
    Recall,
    #[serde(rename = "f1_score")]
    F1Score,
}

impl TargetMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMetric::Accuracy => "accuracy",
            TargetMetric::Precision => "precision",
            TargetMetric::Recall => "recall",
            TargetMetric::F1Score => "f1_score",
        }
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetMetric {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accuracy" => Ok(TargetMetric::Accuracy),
            "precision" => Ok(TargetMetric::Precision),
            "recall" => Ok(TargetMetric::Recall),
            "f1_score" | "f1" => Ok(TargetMetric::F1Score),
            other => Err(ChurnError::UnknownMetric(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl ClassificationMetrics {
    /// Compute metrics from 0/1 labels and predictions. Ratios with a zero
    /// denominator are 0.0.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(ChurnError::InvalidData(format!(
                "{} labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(ChurnError::InvalidData(
                "cannot score an empty holdout set".to_string(),
            ));
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == 1.0, p == 1.0) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(Self {
            accuracy: ratio(tp + tn, y_true.len()),
            precision,
            recall,
            f1_score,
        })
    }

    pub fn get(&self, metric: TargetMetric) -> f64 {
        match metric {
            TargetMetric::Accuracy => self.accuracy,
            TargetMetric::Precision => self.precision,
            TargetMetric::Recall => self.recall,
            TargetMetric::F1Score => self.f1_score,
        }
    }

    /// Flat metric-name to value mapping.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            TargetMetric::Accuracy,
            TargetMetric::Precision,
            TargetMetric::Recall,
            TargetMetric::F1Score,
        ]
        .into_iter()
        .map(|m| (m.as_str().to_string(), self.get(m)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn perfect_predictions() {
        let y = array![0.0, 1.0, 1.0, 0.0];
        let m = ClassificationMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1_score, 1.0);
    }

    #[test]
    fn partial_recall() {
        let y_true = array![0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let y_pred = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();
        assert_eq!(m.precision, 1.0);
        assert!((m.recall - 0.6).abs() < 1e-12);
        assert!((m.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn zero_division_yields_zero() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![0.0, 0.0];
        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn target_metric_names() {
        assert_eq!("f1_score".parse::<TargetMetric>().unwrap(), TargetMetric::F1Score);
        assert!("auc".parse::<TargetMetric>().is_err());
        let json = serde_json::to_string(&TargetMetric::F1Score).unwrap();
        assert_eq!(json, "\"f1_score\"");

        let map = ClassificationMetrics {
            accuracy: 0.5,
            precision: 0.25,
            recall: 1.0,
            f1_score: 0.4,
        }
        .to_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map["recall"], 1.0);
    }
}
