//! Trained pipeline artifact: encoder and estimator fitted together.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::encoder::CategoricalEncoder;
use super::error::{ChurnError, Result};
use super::estimator::{BinaryClassifier, Estimator};
use super::feature::{FeatureRecord, FeatureValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedPipeline {
    pub encoder: CategoricalEncoder,
    /// Column order the estimator was fitted on.
    pub feature_columns: Vec<String>,
    pub estimator: Estimator,
}

/// One scored raw record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub probability: f64,
    /// Values unseen by the encoder in this record.
    pub unseen: usize,
}

impl TrainedPipeline {
    pub fn new(
        encoder: CategoricalEncoder,
        feature_columns: Vec<String>,
        estimator: Estimator,
    ) -> Result<Self> {
        if feature_columns.len() != estimator.n_features() {
            return Err(ChurnError::ShapeMismatch {
                expected: estimator.n_features(),
                actual: feature_columns.len(),
            });
        }
        Ok(Self {
            encoder,
            feature_columns,
            estimator,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Score raw records end to end: encode, then predict.
    pub fn score_records(&self, records: &[FeatureRecord]) -> Result<Vec<Scored>> {
        let mut scored = Vec::with_capacity(records.len());
        for record in records {
            let encoded = self.encoder.transform(std::slice::from_ref(record))?;
            let row = encoded.records.into_iter().next().ok_or_else(|| {
                ChurnError::InvalidData("encoder returned no record".to_string())
            })?;
            let x = self.feature_row(&row)?;
            let proba = self.estimator.predict_proba(&x)?;
            scored.push(Scored {
                probability: proba[0],
                unseen: encoded.unseen,
            });
        }
        Ok(scored)
    }

    /// Predict directly on an already-encoded matrix, bypassing the encoder.
    pub fn predict_encoded(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.estimator.predict(x)
    }

    fn feature_row(&self, record: &FeatureRecord) -> Result<Array2<f64>> {
        let values = self
            .feature_columns
            .iter()
            .map(|column| match record.get(column) {
                Some(FeatureValue::Number(n)) => Ok(*n),
                Some(FeatureValue::Missing) => Err(ChurnError::InvalidData(format!(
                    "feature '{column}' is missing"
                ))),
                Some(FeatureValue::Text(t)) => Err(ChurnError::InvalidData(format!(
                    "feature '{column}' expects a number, got '{t}'"
                ))),
                None => Err(ChurnError::InvalidData(format!(
                    "feature '{column}' is required"
                ))),
            })
            .collect::<Result<Vec<f64>>>()?;
        Array2::from_shape_vec((1, values.len()), values)
            .map_err(|e| ChurnError::InvalidData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::estimator::LogisticRegression;

    fn pipeline() -> TrainedPipeline {
        let mut encoder = CategoricalEncoder::new();
        encoder
            .fit(&[
                FeatureRecord::new().with("contract", "Two year"),
                FeatureRecord::new().with("contract", "Month-to-month"),
            ])
            .unwrap();
        TrainedPipeline::new(
            encoder,
            vec!["contract".into(), "tenure".into()],
            LogisticRegression::from_parameters(vec![4.0, -0.1], -1.0).into(),
        )
        .unwrap()
    }

    #[test]
    fn scores_raw_records_through_encoder() {
        let p = pipeline();
        let records = vec![
            FeatureRecord::new()
                .with("contract", "Month-to-month")
                .with("tenure", 2.0),
            FeatureRecord::new()
                .with("contract", "Two year")
                .with("tenure", 40.0),
        ];
        let scored = p.score_records(&records).unwrap();
        assert!(scored[0].probability > 0.5);
        assert!(scored[1].probability < 0.5);
        assert_eq!(scored[0].unseen, 0);
    }

    #[test]
    fn unseen_category_is_reported() {
        let p = pipeline();
        let scored = p
            .score_records(&[FeatureRecord::new()
                .with("contract", "Weekly")
                .with("tenure", 2.0)])
            .unwrap();
        assert_eq!(scored[0].unseen, 1);
    }

    #[test]
    fn absent_feature_is_rejected() {
        let p = pipeline();
        let err = p
            .score_records(&[FeatureRecord::new().with("contract", "Two year")])
            .unwrap_err();
        assert!(err.to_string().contains("tenure"));
    }

    #[test]
    fn column_count_must_match_estimator() {
        let err = TrainedPipeline::new(
            CategoricalEncoder::new(),
            vec!["a".into()],
            LogisticRegression::from_parameters(vec![1.0, 1.0], 0.0).into(),
        )
        .unwrap_err();
        assert!(matches!(err, ChurnError::ShapeMismatch { .. }));
    }

    #[test]
    fn bytes_round_trip() {
        let p = pipeline();
        let back = TrainedPipeline::from_bytes(&p.to_bytes().unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn stored_weights_reload_bit_for_bit() {
        let weights = vec![0.1 + 0.2, -1.0 / 3.0];
        let intercept = 2.1649348980190578e-17;
        let p = TrainedPipeline::new(
            CategoricalEncoder::new(),
            vec!["tenure".into(), "monthly_charges".into()],
            LogisticRegression::from_parameters(weights, intercept).into(),
        )
        .unwrap();

        let back = TrainedPipeline::from_bytes(&p.to_bytes().unwrap()).unwrap();
        assert_eq!(back, p);

        let x = ndarray::array![[3.0, 70.25], [40.0, 19.9]];
        let before = p.estimator.predict_proba(&x).unwrap();
        let after = back.estimator.predict_proba(&x).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
