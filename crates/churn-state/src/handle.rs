//! SurrealDB Handle - Connection and Operations
//!
//! Manages the connection and provides the operations behind the
//! SurrealDB-backed `RunTracker` and `ModelRegistry`:
//! - runs and their metric log
//! - model versions (monotonic per model name)
//! - alias bindings and alias history
//!
//! Supports in-memory, local file (`surrealkv://`) and remote (WebSocket)
//! connections.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument, warn};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::storage_traits::{
    AliasBinding, AliasEvent, ContentDigest, ModelVersion, NewRun, RunId, RunRecord,
    StorageResult, VersionStatus,
};
use crate::Result;

const DEFAULT_NAMESPACE: &str = "churn";
const DEFAULT_DATABASE: &str = "registry";

/// How many times `register` retries after losing a version-number race.
const MAX_REGISTER_ATTEMPTS: usize = 16;

/// Base delay between `register` attempts; grows linearly per attempt.
const REGISTER_BACKOFF: Duration = Duration::from_millis(2);

/// Configuration for a remote SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "churn")
    pub namespace: String,
    /// Database name (default: "registry")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new cloud configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "churn")
    /// - SURREALDB_DATABASE (optional, default: "registry")
    /// - SURREALDB_ROOT (optional, default: "false") - set to "true" for root users
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB connection handle for the model registry and run tracker.
///
/// Constructed explicitly by whoever needs it and shared via `Arc`.
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbRun {
    run_id: String,
    experiment: String,
    params: serde_json::Value,
    artifact: String,
    created_at: SurrealDatetime,
}

impl DbRun {
    fn into_run_record(self) -> StorageResult<RunRecord> {
        Ok(RunRecord {
            run_id: RunId(self.run_id),
            experiment: self.experiment,
            params: self.params,
            artifact: ContentDigest::try_from(self.artifact)?,
            created_at: DateTime::<Utc>::from(self.created_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbMetric {
    run_id: String,
    metric: String,
    score: f64,
    logged_at: SurrealDatetime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbModelVersion {
    model_name: String,
    version_number: i64,
    artifact: String,
    run_id: Option<String>,
    status: String,
    created_at: SurrealDatetime,
}

impl DbModelVersion {
    fn into_model_version(self) -> StorageResult<ModelVersion> {
        Ok(ModelVersion {
            model_name: self.model_name,
            version: to_version(self.version_number)?,
            artifact: ContentDigest::try_from(self.artifact)?,
            run_id: self.run_id.map(RunId),
            status: self.status.parse()?,
            created_at: DateTime::<Utc>::from(self.created_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbAlias {
    model_name: String,
    alias_name: String,
    version_number: i64,
    updated_at: SurrealDatetime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbAliasEvent {
    model_name: String,
    alias_name: String,
    version_number: i64,
    previous: Option<i64>,
    created_at: SurrealDatetime,
}

#[derive(Debug, Deserialize)]
struct VersionRow {
    version_number: i64,
}

fn to_version(raw: i64) -> StorageResult<u64> {
    u64::try_from(raw).map_err(|_| StorageError::Backend(format!("negative version: {raw}")))
}

fn to_db_version(version: u64) -> StorageResult<i64> {
    i64::try_from(version)
        .map_err(|_| StorageError::Backend(format!("version out of range: {version}")))
}

fn backend(err: surrealdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// Optimistic transaction conflict between concurrent writers. The
/// datastore aborted the commit and the whole transaction may be rerun.
fn is_transaction_conflict(message: &str) -> bool {
    message.contains("can be retried") || message.contains("read or write conflict")
}

/// Another writer took the version number first, either through the
/// unique index or through a conflicting commit.
fn is_version_race(message: &str) -> bool {
    message.contains("already contains") || is_transaction_conflict(message)
}

/// Alias rebinding as a single transaction.
///
/// The transaction re-reads the current binding and aborts with a THROW if
/// it no longer matches `$expected` or if the target version does not
/// exist, so a rebind is all-or-nothing for concurrent readers and writers.
/// Rebinding to the current version writes nothing.
const REBIND_ALIAS_SQL: &str = r#"
    BEGIN TRANSACTION;
    IF array::len((SELECT id FROM model_versions WHERE model_name = $name AND version_number = $version)) = 0 {
        THROW "version not found";
    };
    LET $current = (SELECT VALUE version_number FROM model_aliases WHERE model_name = $name AND alias_name = $alias)[0];
    IF $current != $expected {
        THROW "alias conflict";
    };
    IF $current != $version {
        DELETE model_aliases WHERE model_name = $name AND alias_name = $alias;
        CREATE model_aliases CONTENT {
            model_name: $name,
            alias_name: $alias,
            version_number: $version,
            updated_at: time::now()
        };
        CREATE alias_events CONTENT {
            model_name: $name,
            alias_name: $alias,
            version_number: $version,
            previous: $current,
            created_at: time::now()
        };
        UPDATE model_versions SET status = 'active' WHERE model_name = $name AND version_number = $version;
        IF $current != NONE AND array::len((SELECT id FROM model_aliases WHERE model_name = $name AND version_number = $current)) = 0 {
            UPDATE model_versions SET status = 'archived' WHERE model_name = $name AND version_number = $current;
        };
    };
    COMMIT TRANSACTION;
"#;

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect("mem://").await
    }

    /// Connect to a SurrealDB URL (`mem://`, `surrealkv://path`, `ws://host`)
    /// using the default namespace and database.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        debug!("SurrealDB connected and schema initialized");
        Ok(SurrealHandle { db })
    }

    /// Connect to a remote SurrealDB instance with credentials
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_cloud(config: CloudConfig) -> Result<Self> {
        info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        migrations::init_schema(&db).await?;

        info!("SurrealDB Cloud connected and schema initialized");
        Ok(SurrealHandle { db })
    }

    /// Connect using environment variables, then `fallback_url`.
    ///
    /// If SURREALDB_ENDPOINT is set, connects to cloud.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise connects to `fallback_url`, or in-memory if none is given.
    #[instrument(skip_all)]
    pub async fn setup_from_env(fallback_url: Option<&str>) -> Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            info!("Cloud config found, connecting to SurrealDB Cloud");
            return Self::setup_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            return Self::connect(&url).await;
        }

        if let Some(url) = fallback_url {
            info!("Connecting to configured registry at {}", url);
            return Self::connect(url).await;
        }

        warn!("No registry configured, using in-memory database; state will not persist");
        Self::setup_db().await
    }

    // ========== Run Operations ==========

    /// Create an immutable run record.
    #[instrument(skip(self, run), fields(experiment = %run.experiment, artifact = %run.artifact.short()))]
    pub async fn run_create(&self, run: NewRun) -> StorageResult<RunRecord> {
        let record = DbRun {
            run_id: RunId::new().0,
            experiment: run.experiment,
            params: run.params,
            artifact: run.artifact.as_str().to_string(),
            created_at: SurrealDatetime::from(Utc::now()),
        };

        let created: Option<DbRun> = self
            .db
            .create("runs")
            .content(record)
            .await
            .map_err(backend)?;

        created
            .ok_or_else(|| StorageError::Backend("failed to create run record".to_string()))?
            .into_run_record()
    }

    /// Fetch a run by id.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn run_get(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let mut result = self
            .db
            .query("SELECT * FROM runs WHERE run_id = $run_id")
            .bind(("run_id", run_id.0.clone()))
            .await
            .map_err(backend)?;

        let runs: Vec<DbRun> = result.take(0).map_err(backend)?;
        runs.into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?
            .into_run_record()
    }

    /// Append metric values for a run.
    #[instrument(skip(self, metrics), fields(run_id = %run_id, count = metrics.len()))]
    pub async fn run_log_metrics(
        &self,
        run_id: &RunId,
        metrics: &BTreeMap<String, f64>,
    ) -> StorageResult<()> {
        // Metrics can only be attached to an existing run.
        self.run_get(run_id).await?;

        let logged_at = SurrealDatetime::from(Utc::now());
        for (metric, score) in metrics {
            let row = DbMetric {
                run_id: run_id.0.clone(),
                metric: metric.clone(),
                score: *score,
                logged_at: logged_at.clone(),
            };
            let _created: Option<DbMetric> = self
                .db
                .create("run_metrics")
                .content(row)
                .await
                .map_err(backend)?;
        }
        debug!("Metrics logged");
        Ok(())
    }

    /// Latest value per metric name for a run.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn run_metrics(&self, run_id: &RunId) -> StorageResult<BTreeMap<String, f64>> {
        self.run_get(run_id).await?;

        let mut result = self
            .db
            .query("SELECT * FROM run_metrics WHERE run_id = $run_id ORDER BY logged_at ASC")
            .bind(("run_id", run_id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<DbMetric> = result.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(|r| (r.metric, r.score)).collect())
    }

    /// List runs, oldest first.
    #[instrument(skip(self))]
    pub async fn run_list(&self, experiment: Option<&str>) -> StorageResult<Vec<RunRecord>> {
        let mut result = match experiment {
            Some(experiment) => self
                .db
                .query("SELECT * FROM runs WHERE experiment = $experiment ORDER BY created_at ASC")
                .bind(("experiment", experiment.to_string()))
                .await
                .map_err(backend)?,
            None => self
                .db
                .query("SELECT * FROM runs ORDER BY created_at ASC")
                .await
                .map_err(backend)?,
        };

        let runs: Vec<DbRun> = result.take(0).map_err(backend)?;
        runs.into_iter().map(DbRun::into_run_record).collect()
    }

    // ========== Model Version Operations ==========

    async fn latest_version_number(&self, model_name: &str) -> StorageResult<Option<i64>> {
        let mut result = self
            .db
            .query(
                "SELECT version_number FROM model_versions WHERE model_name = $name \
                 ORDER BY version_number DESC LIMIT 1",
            )
            .bind(("name", model_name.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<VersionRow> = result.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(|r| r.version_number))
    }

    /// Register a new version numbered one past the current maximum.
    #[instrument(skip(self, artifact, run_id), fields(model = %model_name, artifact = %artifact.short()))]
    pub async fn version_register(
        &self,
        model_name: &str,
        artifact: &ContentDigest,
        run_id: Option<&RunId>,
    ) -> StorageResult<ModelVersion> {
        for attempt in 1..=MAX_REGISTER_ATTEMPTS {
            let next = self.latest_version_number(model_name).await?.unwrap_or(0) + 1;
            let record = DbModelVersion {
                model_name: model_name.to_string(),
                version_number: next,
                artifact: artifact.as_str().to_string(),
                run_id: run_id.map(|r| r.0.clone()),
                status: VersionStatus::Active.as_str().to_string(),
                created_at: SurrealDatetime::from(Utc::now()),
            };

            match self.db.create("model_versions").content(record).await {
                Ok(created) => {
                    let created: Option<DbModelVersion> = created;
                    let version = created
                        .ok_or_else(|| {
                            StorageError::Backend("failed to create model version".to_string())
                        })?
                        .into_model_version()?;
                    info!(version = version.version, "Model version registered");
                    return Ok(version);
                }
                Err(e) if is_version_race(&e.to_string()) => {
                    debug!(attempt, next, error = %e, "Version number taken concurrently, retrying");
                    tokio::time::sleep(REGISTER_BACKOFF * attempt as u32).await;
                }
                Err(e) => return Err(backend(e)),
            }
        }

        Err(StorageError::Backend(format!(
            "could not allocate a version number for '{}' after {} attempts",
            model_name, MAX_REGISTER_ATTEMPTS
        )))
    }

    /// Fetch one version.
    #[instrument(skip(self), fields(model = %model_name))]
    pub async fn version_get(&self, model_name: &str, version: u64) -> StorageResult<ModelVersion> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM model_versions WHERE model_name = $name AND version_number = $version",
            )
            .bind(("name", model_name.to_string()))
            .bind(("version", to_db_version(version)?))
            .await
            .map_err(backend)?;

        let rows: Vec<DbModelVersion> = result.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::VersionNotFound {
                name: model_name.to_string(),
                version,
            })?
            .into_model_version()
    }

    /// All versions of a model, ascending.
    #[instrument(skip(self), fields(model = %model_name))]
    pub async fn version_list(&self, model_name: &str) -> StorageResult<Vec<ModelVersion>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM model_versions WHERE model_name = $name ORDER BY version_number ASC",
            )
            .bind(("name", model_name.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<DbModelVersion> = result.take(0).map_err(backend)?;
        rows.into_iter()
            .map(DbModelVersion::into_model_version)
            .collect()
    }

    // ========== Alias Operations ==========

    /// Current version bound to an alias, if any.
    #[instrument(skip(self), fields(model = %model_name, alias = %alias))]
    pub async fn alias_current(&self, model_name: &str, alias: &str) -> StorageResult<Option<u64>> {
        let mut result = self
            .db
            .query(
                "SELECT version_number FROM model_aliases \
                 WHERE model_name = $name AND alias_name = $alias",
            )
            .bind(("name", model_name.to_string()))
            .bind(("alias", alias.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<VersionRow> = result.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .map(|r| to_version(r.version_number))
            .transpose()
    }

    /// Atomically rebind `alias` to `version` if it is currently bound to
    /// `expected`. Returns the previous binding (always equal to `expected`).
    #[instrument(skip(self), fields(model = %model_name, alias = %alias))]
    pub async fn alias_compare_and_set(
        &self,
        model_name: &str,
        alias: &str,
        expected: Option<u64>,
        version: u64,
    ) -> StorageResult<Option<u64>> {
        let expected_db = expected.map(to_db_version).transpose()?;

        let errors: Vec<String> = match self
            .db
            .query(REBIND_ALIAS_SQL)
            .bind(("name", model_name.to_string()))
            .bind(("alias", alias.to_string()))
            .bind(("version", to_db_version(version)?))
            .bind(("expected", expected_db))
            .await
        {
            Ok(mut response) => response
                .take_errors()
                .into_values()
                .map(|e| e.to_string())
                .collect(),
            Err(e) => vec![e.to_string()],
        };

        if errors.iter().any(|e| e.contains("version not found")) {
            return Err(StorageError::VersionNotFound {
                name: model_name.to_string(),
                version,
            });
        }
        // A losing concurrent commit is reported like a stale expectation so
        // callers re-read the alias and retry.
        if errors
            .iter()
            .any(|e| e.contains("alias conflict") || is_transaction_conflict(e))
        {
            let actual = self.alias_current(model_name, alias).await?;
            return Err(StorageError::AliasConflict {
                name: model_name.to_string(),
                alias: alias.to_string(),
                expected,
                actual,
            });
        }
        if let Some(first) = errors.into_iter().next() {
            return Err(StorageError::Backend(first));
        }

        info!(version, previous = ?expected, "Alias rebound");
        Ok(expected)
    }

    /// All current alias bindings of a model, ordered by alias name.
    #[instrument(skip(self), fields(model = %model_name))]
    pub async fn alias_list(&self, model_name: &str) -> StorageResult<Vec<AliasBinding>> {
        let mut result = self
            .db
            .query("SELECT * FROM model_aliases WHERE model_name = $name ORDER BY alias_name ASC")
            .bind(("name", model_name.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<DbAlias> = result.take(0).map_err(backend)?;
        rows.into_iter()
            .map(|r| {
                Ok(AliasBinding {
                    model_name: r.model_name,
                    alias: r.alias_name,
                    version: to_version(r.version_number)?,
                    updated_at: DateTime::<Utc>::from(r.updated_at),
                })
            })
            .collect()
    }

    /// Rebinding history of an alias, newest first.
    #[instrument(skip(self), fields(model = %model_name, alias = %alias))]
    pub async fn alias_history(&self, model_name: &str, alias: &str) -> StorageResult<Vec<AliasEvent>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM alias_events WHERE model_name = $name AND alias_name = $alias \
                 ORDER BY created_at DESC",
            )
            .bind(("name", model_name.to_string()))
            .bind(("alias", alias.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<DbAliasEvent> = result.take(0).map_err(backend)?;
        rows.into_iter()
            .map(|r| {
                Ok(AliasEvent {
                    model_name: r.model_name,
                    alias: r.alias_name,
                    version: to_version(r.version_number)?,
                    previous: r.previous.map(to_version).transpose()?,
                    created_at: DateTime::<Utc>::from(r.created_at),
                })
            })
            .collect()
    }
}
