//! Feature records, datasets and the pre-encoded numeric table.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::error::{ChurnError, Result};

/// A single raw feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FeatureValue {
    /// Convert a JSON document value. `"na"` and `null` become missing,
    /// booleans become 0/1. Nested values are rejected.
    pub fn from_json(field: &str, value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(FeatureValue::Missing),
            Value::Bool(b) => Ok(FeatureValue::Number(if b { 1.0 } else { 0.0 })),
            Value::Number(n) => n.as_f64().map(FeatureValue::Number).ok_or_else(|| {
                ChurnError::InvalidData(format!("field '{field}': number out of range"))
            }),
            Value::String(s) if s == "na" => Ok(FeatureValue::Missing),
            Value::String(s) => Ok(FeatureValue::Text(s)),
            Value::Array(_) | Value::Object(_) => Err(ChurnError::InvalidData(format!(
                "field '{field}': nested values are not supported"
            ))),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Category label for this value; numbers are stringified.
    pub fn category(&self) -> Option<String> {
        match self {
            FeatureValue::Number(n) => Some(n.to_string()),
            FeatureValue::Text(s) => Some(s.clone()),
            FeatureValue::Missing => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Text(value)
    }
}

/// Open record of named feature values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord(BTreeMap<String, FeatureValue>);

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<FeatureValue>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FeatureValue> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FeatureValue) {
        self.0.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<FeatureValue> {
        self.0.remove(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FeatureValue)> {
        self.0.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FeatureValue)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        FeatureRecord(iter.into_iter().collect())
    }
}

/// Ordered collection of records plus the column names in first-discovery
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<FeatureRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<FeatureRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for field in record.fields() {
                if !columns.iter().any(|c| c == field) {
                    columns.push(field.to_string());
                }
            }
        }
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop a column from every record.
    pub fn drop_column(&mut self, column: &str) {
        self.columns.retain(|c| c != column);
        for record in &mut self.records {
            record.remove(column);
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

/// Pre-encoded numeric table. The target column is LAST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl EncodedTable {
    pub fn target_column(&self) -> Option<&str> {
        self.columns.last().map(String::as_str)
    }

    pub fn feature_columns(&self) -> &[String] {
        match self.columns.split_last() {
            Some((_, features)) => features,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Split into a feature matrix and a binary label vector.
    pub fn split_xy(&self) -> Result<(Array2<f64>, Array1<f64>)> {
        if self.columns.len() < 2 {
            return Err(ChurnError::InvalidData(
                "table needs at least one feature column and a target column".to_string(),
            ));
        }
        if self.rows.is_empty() {
            return Err(ChurnError::InvalidData("table has no rows".to_string()));
        }

        let width = self.columns.len();
        let n_features = width - 1;
        let mut features = Vec::with_capacity(self.rows.len() * n_features);
        let mut labels = Vec::with_capacity(self.rows.len());

        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != width {
                return Err(ChurnError::InvalidData(format!(
                    "row {i} has {} values, expected {width}",
                    row.len()
                )));
            }
            let label = row[n_features];
            if label != 0.0 && label != 1.0 {
                return Err(ChurnError::InvalidLabel { row: i, value: label });
            }
            features.extend_from_slice(&row[..n_features]);
            labels.push(label);
        }

        let x = Array2::from_shape_vec((self.rows.len(), n_features), features)
            .map_err(|e| ChurnError::InvalidData(e.to_string()))?;
        Ok((x, Array1::from_vec(labels)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

/// Typed serving-side customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub tenure: i64,
    pub monthly_charges: f64,
    pub total_charges: f64,
    pub contract: String,
    pub payment_method: String,
    pub internet_service: String,
    pub tech_support: String,
    pub online_security: String,
    pub support_calls: i64,
}

impl From<CustomerProfile> for FeatureRecord {
    fn from(p: CustomerProfile) -> Self {
        FeatureRecord::new()
            .with("tenure", p.tenure as f64)
            .with("monthly_charges", p.monthly_charges)
            .with("total_charges", p.total_charges)
            .with("contract", p.contract)
            .with("payment_method", p.payment_method)
            .with("internet_service", p.internet_service)
            .with("tech_support", p.tech_support)
            .with("online_security", p.online_security)
            .with("support_calls", p.support_calls as f64)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
