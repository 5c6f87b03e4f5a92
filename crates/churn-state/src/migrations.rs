//! SurrealDB schema migrations and initialization
//!
//! Every statement uses `IF NOT EXISTS`, so running the migrations on each
//! connection is idempotent.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all lifecycle tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing churn registry schema");

    init_runs_table(db).await?;
    init_run_metrics_table(db).await?;
    init_model_versions_table(db).await?;
    init_model_aliases_table(db).await?;
    init_alias_events_table(db).await?;

    info!("Churn registry schema initialization complete");
    Ok(())
}

async fn apply(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    debug!(table, "Applying schema");
    db.query(sql)
        .await
        .and_then(|response| response.check())
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?;
    Ok(())
}

/// Initialize `runs` table
///
/// Schema:
/// ```text
/// TABLE runs {
///   run_id:      STRING (unique)
///   experiment:  STRING (indexed)
///   params:      OBJECT
///   artifact:    STRING (content digest of the trained pipeline)
///   created_at:  DATETIME
/// }
/// ```
///
/// Runs are written once; no update path exists in the application.
async fn init_runs_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS runs SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS run_id ON runs TYPE string;
        DEFINE FIELD IF NOT EXISTS experiment ON runs TYPE string;
        DEFINE FIELD IF NOT EXISTS params ON runs FLEXIBLE TYPE object;
        DEFINE FIELD IF NOT EXISTS artifact ON runs TYPE string;
        DEFINE FIELD IF NOT EXISTS created_at ON runs TYPE datetime;
        DEFINE INDEX IF NOT EXISTS idx_run_id ON runs FIELDS run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_experiment ON runs FIELDS experiment;
    "#;
    apply(db, "runs", sql).await
}

/// Initialize `run_metrics` table (append-only metric log per run)
async fn init_run_metrics_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS run_metrics SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS run_id ON run_metrics TYPE string;
        DEFINE FIELD IF NOT EXISTS metric ON run_metrics TYPE string;
        DEFINE FIELD IF NOT EXISTS score ON run_metrics TYPE number;
        DEFINE FIELD IF NOT EXISTS logged_at ON run_metrics TYPE datetime;
        DEFINE INDEX IF NOT EXISTS idx_metric_run ON run_metrics FIELDS run_id;
    "#;
    apply(db, "run_metrics", sql).await
}

/// Initialize `model_versions` table
///
/// The unique `(model_name, version_number)` index is what keeps version
/// numbers monotonic under concurrent registration: a writer that loses the
/// race gets an index violation and retries with the next number.
async fn init_model_versions_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS model_versions SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS model_name ON model_versions TYPE string;
        DEFINE FIELD IF NOT EXISTS version_number ON model_versions TYPE int;
        DEFINE FIELD IF NOT EXISTS artifact ON model_versions TYPE string;
        DEFINE FIELD IF NOT EXISTS run_id ON model_versions TYPE option<string>;
        DEFINE FIELD IF NOT EXISTS status ON model_versions TYPE string
            ASSERT $value INSIDE ['active', 'archived'];
        DEFINE FIELD IF NOT EXISTS created_at ON model_versions TYPE datetime;
        DEFINE INDEX IF NOT EXISTS idx_model_version ON model_versions
            FIELDS model_name, version_number UNIQUE;
    "#;
    apply(db, "model_versions", sql).await
}

/// Initialize `model_aliases` table (one row per bound alias)
async fn init_model_aliases_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS model_aliases SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS model_name ON model_aliases TYPE string;
        DEFINE FIELD IF NOT EXISTS alias_name ON model_aliases TYPE string;
        DEFINE FIELD IF NOT EXISTS version_number ON model_aliases TYPE int;
        DEFINE FIELD IF NOT EXISTS updated_at ON model_aliases TYPE datetime;
        DEFINE INDEX IF NOT EXISTS idx_model_alias ON model_aliases
            FIELDS model_name, alias_name UNIQUE;
    "#;
    apply(db, "model_aliases", sql).await
}

/// Initialize `alias_events` table (rebinding audit trail)
async fn init_alias_events_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS alias_events SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS model_name ON alias_events TYPE string;
        DEFINE FIELD IF NOT EXISTS alias_name ON alias_events TYPE string;
        DEFINE FIELD IF NOT EXISTS version_number ON alias_events TYPE int;
        DEFINE FIELD IF NOT EXISTS previous ON alias_events TYPE option<int>;
        DEFINE FIELD IF NOT EXISTS created_at ON alias_events TYPE datetime;
        DEFINE INDEX IF NOT EXISTS idx_alias_event ON alias_events
            FIELDS model_name, alias_name;
    "#;
    apply(db, "alias_events", sql).await
}
