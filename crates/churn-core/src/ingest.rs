//! Document-store ingestion.
//!
//! Customer documents arrive as a JSON Lines export of the document store.
//! The store's `_id` field is dropped and the literal `"na"` marks a
//! missing value.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{ChurnError, Dataset, FeatureRecord, FeatureValue, Result};

/// Field added by the document store to every document.
pub const STORE_ID_FIELD: &str = "_id";

/// A source of raw customer documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FeatureRecord>>;
}

/// Reads one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse a JSON Lines document export. Blank lines are skipped.
pub fn parse_json_lines(contents: &str) -> Result<Vec<FeatureRecord>> {
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let doc: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)
            .map_err(|e| ChurnError::InvalidData(format!("line {}: {e}", i + 1)))?;

        let record = doc
            .into_iter()
            .filter(|(field, _)| field != STORE_ID_FIELD)
            .map(|(field, value)| {
                let value = FeatureValue::from_json(&field, value)?;
                Ok((field, value))
            })
            .collect::<Result<FeatureRecord>>()?;
        records.push(record);
    }
    Ok(records)
}

#[async_trait]
impl DocumentSource for JsonLinesSource {
    async fn fetch(&self) -> Result<Vec<FeatureRecord>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let records = parse_json_lines(&contents)?;
        debug!(path = %self.path.display(), records = records.len(), "documents read");
        Ok(records)
    }
}

/// Pull every document from `source` and persist it as a dataset.
pub async fn ingest(source: &dyn DocumentSource, dataset_path: &Path) -> Result<Dataset> {
    let records = source.fetch().await?;
    if records.is_empty() {
        return Err(ChurnError::InvalidData(
            "document source returned no records".to_string(),
        ));
    }
    let dataset = Dataset::from_records(records);
    dataset.save(dataset_path)?;
    info!(
        records = dataset.len(),
        columns = dataset.columns.len(),
        path = %dataset_path.display(),
        "dataset ingested"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_store_id_and_maps_na() {
        let records = parse_json_lines(
            r#"{"_id": "65f0", "customer_id": "C-1", "tenure": 5, "contract": "na"}

{"_id": "65f1", "customer_id": "C-2", "tenure": "na", "contract": "One year"}"#,
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].get("_id").is_none());
        assert_eq!(records[0].get("tenure"), Some(&FeatureValue::Number(5.0)));
        assert_eq!(records[0].get("contract"), Some(&FeatureValue::Missing));
        assert_eq!(records[1].get("tenure"), Some(&FeatureValue::Missing));
    }

    #[test]
    fn malformed_line_names_line_number() {
        let err = parse_json_lines("{\"a\": 1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn ingest_writes_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("customers.jsonl");
        std::fs::write(&export, "{\"tenure\": 1, \"churn\": 0}\n{\"tenure\": 2, \"churn\": 1}\n")
            .unwrap();
        let out = dir.path().join("out").join("dataset.json");

        let dataset = ingest(&JsonLinesSource::new(&export), &out).await.unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(Dataset::load(&out).unwrap(), dataset);
    }

    #[tokio::test]
    async fn ingest_rejects_empty_export() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("empty.jsonl");
        std::fs::write(&export, "\n").unwrap();
        let err = ingest(&JsonLinesSource::new(&export), &dir.path().join("d.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChurnError::InvalidData(_)));
    }
}
