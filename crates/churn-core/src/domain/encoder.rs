//! Categorical encoder.
//!
//! Maps categorical feature values to stable integer indices learned at fit
//! time. A field is categorical when any fitted record carries a text value
//! for it. Indices follow first-occurrence order and never change after fit.
//!
//! Values unseen during fit encode to index `0`, the same index as the first
//! category observed for that field. Callers get the number of such
//! collisions back from [`CategoricalEncoder::transform`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::EncoderError;
use super::feature::{FeatureRecord, FeatureValue};

/// Index assigned to values not present in a field's vocabulary.
pub const UNSEEN_INDEX: usize = 0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    vocabularies: BTreeMap<String, Vec<String>>,
    fitted: bool,
}

/// Output of [`CategoricalEncoder::transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub records: Vec<FeatureRecord>,
    /// Number of values that were not in the fitted vocabulary and were
    /// mapped to [`UNSEEN_INDEX`].
    pub unseen: usize,
}

impl CategoricalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Names of the fields this encoder rewrites.
    pub fn encoded_fields(&self) -> impl Iterator<Item = &str> {
        self.vocabularies.keys().map(String::as_str)
    }

    /// Fitted categories of `field`, in index order.
    pub fn vocabulary(&self, field: &str) -> Option<&[String]> {
        self.vocabularies.get(field).map(Vec::as_slice)
    }

    /// Learn vocabularies from `records`. May only be called once.
    pub fn fit(&mut self, records: &[FeatureRecord]) -> Result<(), EncoderError> {
        if self.fitted {
            return Err(EncoderError::AlreadyFitted);
        }

        let mut vocabularies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in records {
            for (field, value) in record.iter() {
                if matches!(value, FeatureValue::Text(_)) {
                    vocabularies.entry(field.to_string()).or_default();
                }
            }
        }

        for record in records {
            for (field, vocab) in vocabularies.iter_mut() {
                let Some(category) = record.get(field).and_then(FeatureValue::category) else {
                    continue;
                };
                if !vocab.contains(&category) {
                    vocab.push(category);
                }
            }
        }

        debug!(fields = vocabularies.len(), "encoder fitted");
        self.vocabularies = vocabularies;
        self.fitted = true;
        Ok(())
    }

    /// Fit on `records` and return them encoded.
    pub fn fit_transform(&mut self, records: &[FeatureRecord]) -> Result<Transformed, EncoderError> {
        self.fit(records)?;
        self.transform(records)
    }

    /// Encode every categorical field of `records`.
    ///
    /// Fields absent from a record stay absent, missing values stay
    /// missing, and fields that were not categorical at fit time pass
    /// through unchanged.
    pub fn transform(&self, records: &[FeatureRecord]) -> Result<Transformed, EncoderError> {
        if !self.fitted {
            return Err(EncoderError::NotFitted);
        }

        let mut unseen = 0;
        let records = records
            .iter()
            .map(|record| {
                let mut out = record.clone();
                for (field, value) in out.iter_mut() {
                    let Some(vocab) = self.vocabularies.get(field) else {
                        continue;
                    };
                    let Some(category) = value.category() else {
                        continue;
                    };
                    let index = match vocab.iter().position(|c| *c == category) {
                        Some(i) => i,
                        None => {
                            unseen += 1;
                            UNSEEN_INDEX
                        }
                    };
                    *value = FeatureValue::Number(index as f64);
                }
                out
            })
            .collect();

        if unseen > 0 {
            debug!(unseen, "unseen categories mapped to index 0");
        }
        Ok(Transformed { records, unseen })
    }
}
