//! Binary estimators.
//!
//! The lifecycle treats the estimator as a black box behind
//! [`BinaryClassifier`]; [`Estimator`] is the serializable set of concrete
//! models a pipeline artifact can carry.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::error::{ChurnError, Result};

/// Probability at or above which a sample is classified as churn.
pub const DECISION_THRESHOLD: f64 = 0.5;

pub trait BinaryClassifier {
    /// Number of input features the model was fitted on.
    fn n_features(&self) -> usize;

    /// Probability of the positive class for every row of `x`.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard 0/1 predictions.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p >= DECISION_THRESHOLD { 1.0 } else { 0.0 }))
    }
}

/// Gradient-descent settings for [`LogisticRegression::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub max_iter: usize,
    /// L2 regularization strength
    pub alpha: f64,
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 1000,
            alpha: 0.01,
            tol: 1e-6,
        }
    }
}

/// Logistic regression on standardized inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    coefficients: Array1<f64>,
    intercept: f64,
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl LogisticRegression {
    /// Model with fixed weights over unscaled inputs.
    pub fn from_parameters(coefficients: Vec<f64>, intercept: f64) -> Self {
        let n = coefficients.len();
        Self {
            coefficients: Array1::from_vec(coefficients),
            intercept,
            means: Array1::zeros(n),
            scales: Array1::ones(n),
        }
    }

    /// Fit by batch gradient descent on the log loss.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &LogisticParams) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(ChurnError::InvalidData(
                "cannot fit on an empty feature matrix".to_string(),
            ));
        }
        if n_samples != y.len() {
            return Err(ChurnError::InvalidData(format!(
                "{} labels for {} samples",
                y.len(),
                n_samples
            )));
        }

        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ChurnError::InvalidData("empty feature matrix".to_string()))?;
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        let xs = (x - &means) / &scales;

        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;
        for _ in 0..params.max_iter {
            let predictions = sigmoid(&(xs.dot(&weights) + bias));
            let errors = &predictions - y;
            let dw = xs.t().dot(&errors) / n_samples as f64 + params.alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < params.tol {
                break;
            }
            weights = weights - params.learning_rate * dw;
            bias -= params.learning_rate * db;
        }

        Ok(Self {
            coefficients: weights,
            intercept: bias,
            means,
            scales,
        })
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl BinaryClassifier for LogisticRegression {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ChurnError::ShapeMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        let xs = (x - &self.means) / &self.scales;
        Ok(sigmoid(&(xs.dot(&self.coefficients) + self.intercept)))
    }
}

fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Serializable estimator carried inside a pipeline artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Logistic(LogisticRegression),
}

impl BinaryClassifier for Estimator {
    fn n_features(&self) -> usize {
        match self {
            Estimator::Logistic(m) => m.n_features(),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Estimator::Logistic(m) => m.predict_proba(x),
        }
    }
}

impl From<LogisticRegression> for Estimator {
    fn from(model: LogisticRegression) -> Self {
        Estimator::Logistic(model)
    }
}
