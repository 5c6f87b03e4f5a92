//! Data preparation: fill missing values, encode categoricals, split.
//!
//! Produces the pre-encoded train/test tables (target column last) and the
//! fitted encoder that training later embeds in the pipeline artifact.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::{PathsConfig, TrainingConfig};
use crate::domain::{
    CategoricalEncoder, ChurnError, Dataset, EncodedTable, FeatureRecord, FeatureValue, Result,
};

/// Fill value for missing categorical entries.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct PreparedData {
    pub encoder: CategoricalEncoder,
    pub train: EncodedTable,
    pub test: EncodedTable,
}

/// Fill, encode and split `dataset`.
pub fn prepare(dataset: &Dataset, training: &TrainingConfig) -> Result<PreparedData> {
    let target = training.target_column.as_str();
    if !dataset.columns.iter().any(|c| c == target) {
        return Err(ChurnError::InvalidData(format!(
            "target column '{target}' not found in dataset"
        )));
    }

    let mut dataset = dataset.clone();
    if let Some(id) = &training.id_column {
        dataset.drop_column(id);
    }

    let mut labels = Vec::with_capacity(dataset.len());
    for (row, record) in dataset.records.iter_mut().enumerate() {
        let value = record.remove(target).unwrap_or(FeatureValue::Missing);
        labels.push(parse_label(row, &value)?);
    }

    let feature_columns: Vec<String> = dataset
        .columns
        .iter()
        .filter(|c| c.as_str() != target)
        .cloned()
        .collect();
    if feature_columns.is_empty() {
        return Err(ChurnError::InvalidData(
            "dataset has no feature columns".to_string(),
        ));
    }

    fill_missing(&mut dataset.records, &feature_columns);

    let mut encoder = CategoricalEncoder::new();
    let encoded = encoder.fit_transform(&dataset.records)?;

    let mut rows = Vec::with_capacity(encoded.records.len());
    for (record, label) in encoded.records.iter().zip(&labels) {
        let mut row = Vec::with_capacity(feature_columns.len() + 1);
        for column in &feature_columns {
            match record.get(column) {
                Some(FeatureValue::Number(n)) => row.push(*n),
                other => {
                    return Err(ChurnError::InvalidData(format!(
                        "column '{column}' did not encode to a number: {other:?}"
                    )))
                }
            }
        }
        row.push(*label);
        rows.push(row);
    }

    let mut columns = feature_columns;
    columns.push(target.to_string());
    let (train, test) = split(columns, rows, training.test_size, training.random_seed)?;

    info!(
        train_rows = train.len(),
        test_rows = test.len(),
        features = train.feature_columns().len(),
        encoded_fields = encoder.encoded_fields().count(),
        "data prepared"
    );
    Ok(PreparedData {
        encoder,
        train,
        test,
    })
}

/// Load the ingested dataset, prepare it, and persist encoder and tables.
pub fn prepare_to_disk(paths: &PathsConfig, training: &TrainingConfig) -> Result<PreparedData> {
    let dataset = Dataset::load(&paths.dataset())?;
    let prepared = prepare(&dataset, training)?;

    let encoder_path = paths.encoder();
    if let Some(parent) = encoder_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&encoder_path, serde_json::to_vec(&prepared.encoder)?)?;
    prepared.train.save(&paths.train_table())?;
    prepared.test.save(&paths.test_table())?;
    debug!(dir = %paths.artifacts_root.display(), "prepared artifacts written");
    Ok(prepared)
}

/// Interpret a target value as a 0/1 churn label.
fn parse_label(row: usize, value: &FeatureValue) -> Result<f64> {
    match value {
        FeatureValue::Number(n) if *n == 0.0 || *n == 1.0 => Ok(*n),
        FeatureValue::Number(n) => Err(ChurnError::InvalidLabel { row, value: *n }),
        FeatureValue::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "churn" => Ok(1.0),
            "0" | "no" | "false" | "no churn" => Ok(0.0),
            _ => Err(ChurnError::InvalidData(format!(
                "row {row}: unrecognised target value '{t}'"
            ))),
        },
        FeatureValue::Missing => Err(ChurnError::InvalidData(format!(
            "row {row}: target value is missing"
        ))),
    }
}

/// Categorical columns get [`UNKNOWN_CATEGORY`], numeric columns the median
/// of their present values. Absent fields count as missing.
fn fill_missing(records: &mut [FeatureRecord], columns: &[String]) {
    for column in columns {
        let categorical = records
            .iter()
            .any(|r| matches!(r.get(column), Some(FeatureValue::Text(_))));

        let fill = if categorical {
            FeatureValue::Text(UNKNOWN_CATEGORY.to_string())
        } else {
            let mut values: Vec<f64> = records
                .iter()
                .filter_map(|r| r.get(column).and_then(FeatureValue::as_number))
                .collect();
            FeatureValue::Number(median(&mut values).unwrap_or(0.0))
        };

        let mut filled = 0usize;
        for record in records.iter_mut() {
            if record.get(column).map_or(true, FeatureValue::is_missing) {
                record.insert(column.clone(), fill.clone());
                filled += 1;
            }
        }
        if filled > 0 {
            debug!(column = %column, filled, categorical, "missing values filled");
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Seeded shuffle split; the test partition gets `ceil(n * test_size)` rows.
fn split(
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    test_size: f64,
    seed: u64,
) -> Result<(EncodedTable, EncodedTable)> {
    let n = rows.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(ChurnError::InvalidData(format!(
            "{n} rows cannot be split with test_size {test_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (test_idx, train_idx) = indices.split_at(n_test);
    let pick = |idx: &[usize]| EncodedTable {
        columns: columns.clone(),
        rows: idx.iter().map(|&i| rows[i].clone()).collect(),
    };
    Ok((pick(train_idx), pick(test_idx)))
}
