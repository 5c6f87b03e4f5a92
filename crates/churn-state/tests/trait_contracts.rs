//! Trait contract tests for ArtifactStore, RunTracker, and ModelRegistry.
//!
//! These tests verify the behavioral contracts of the storage traits
//! using in-memory fakes. Any conforming implementation must pass these.

use std::collections::BTreeMap;

use churn_state::fakes::{MemoryArtifactStore, MemoryModelRegistry, MemoryRunTracker};
use churn_state::storage_traits::*;
use churn_state::StorageError;

fn sample_run(artifact: &ContentDigest) -> NewRun {
    NewRun {
        experiment: "churn-training".to_string(),
        params: serde_json::json!({ "max_iter": 1000, "test_size": 0.2 }),
        artifact: artifact.clone(),
    }
}

// ===========================================================================
// ArtifactStore contract tests
// ===========================================================================

#[tokio::test]
async fn artifact_put_returns_correct_digest() {
    let store = MemoryArtifactStore::new();
    let data = b"serialized pipeline";
    let digest = store.put(data).await.unwrap();

    assert_eq!(digest, ContentDigest::from_bytes(data));
}

#[tokio::test]
async fn artifact_get_returns_stored_bytes() {
    let store = MemoryArtifactStore::new();
    let digest = store.put(b"pipeline bytes").await.unwrap();

    assert_eq!(store.get(&digest).await.unwrap(), b"pipeline bytes");
}

#[tokio::test]
async fn artifact_get_not_found() {
    let store = MemoryArtifactStore::new();
    let bogus = ContentDigest::from_bytes(b"never stored");
    let err = store.get(&bogus).await.unwrap_err();

    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn artifact_same_content_same_digest() {
    let store = MemoryArtifactStore::new();
    let d1 = store.put(b"identical").await.unwrap();
    let d2 = store.put(b"identical").await.unwrap();
    let d3 = store.put(b"different").await.unwrap();

    assert_eq!(d1, d2);
    assert_ne!(d1, d3);
    assert!(store.contains(&d3).await.unwrap());
}

#[test]
fn digest_rejects_non_hex() {
    let err = ContentDigest::try_from("not-a-digest".to_string()).unwrap_err();
    assert!(matches!(err, StorageError::InvalidDigest { .. }));
}

// ===========================================================================
// RunTracker contract tests
// ===========================================================================

#[tokio::test]
async fn run_create_and_get() {
    let tracker = MemoryRunTracker::new();
    let artifact = ContentDigest::from_bytes(b"model");
    let run = tracker.create_run(sample_run(&artifact)).await.unwrap();

    let fetched = tracker.get_run(&run.run_id).await.unwrap();
    assert_eq!(fetched.run_id, run.run_id);
    assert_eq!(fetched.artifact, artifact);
    assert_eq!(fetched.params["max_iter"], 1000);
}

#[tokio::test]
async fn run_metrics_latest_value_wins() {
    let tracker = MemoryRunTracker::new();
    let run = tracker
        .create_run(sample_run(&ContentDigest::from_bytes(b"model")))
        .await
        .unwrap();

    let mut first = BTreeMap::new();
    first.insert("f1_score".to_string(), 0.5);
    first.insert("accuracy".to_string(), 0.7);
    tracker.log_metrics(&run.run_id, &first).await.unwrap();

    let mut second = BTreeMap::new();
    second.insert("f1_score".to_string(), 0.6);
    tracker.log_metrics(&run.run_id, &second).await.unwrap();

    let metrics = tracker.get_metrics(&run.run_id).await.unwrap();
    assert_eq!(metrics["f1_score"], 0.6);
    assert_eq!(metrics["accuracy"], 0.7);
}

#[tokio::test]
async fn run_log_metrics_unknown_run_fails() {
    let tracker = MemoryRunTracker::new();
    let err = tracker
        .log_metrics(&RunId::new(), &BTreeMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::RunNotFound { .. }));
}

#[tokio::test]
async fn run_list_filters_by_experiment() {
    let tracker = MemoryRunTracker::new();
    let artifact = ContentDigest::from_bytes(b"model");
    let a = tracker.create_run(sample_run(&artifact)).await.unwrap();
    tracker
        .create_run(NewRun {
            experiment: "other".to_string(),
            ..sample_run(&artifact)
        })
        .await
        .unwrap();

    let runs = tracker.list_runs(Some("churn-training")).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, a.run_id);
    assert_eq!(tracker.list_runs(None).await.unwrap().len(), 2);
}

// ===========================================================================
// ModelRegistry contract tests
// ===========================================================================

#[tokio::test]
async fn registry_versions_are_monotonic_per_model() {
    let registry = MemoryModelRegistry::new();
    let d = ContentDigest::from_bytes(b"a");

    let v1 = registry.register("churn", &d, None).await.unwrap();
    let v2 = registry.register("churn", &d, None).await.unwrap();
    let other = registry.register("other", &d, None).await.unwrap();

    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_eq!(other.version, 1);
    assert_eq!(registry.list_versions("churn").await.unwrap().len(), 2);
}

#[tokio::test]
async fn registry_resolve_unbound_alias_is_none() {
    let registry = MemoryModelRegistry::new();
    assert!(registry
        .resolve_alias("churn", "production")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn registry_set_alias_unknown_version_fails() {
    let registry = MemoryModelRegistry::new();
    registry
        .register("churn", &ContentDigest::from_bytes(b"a"), None)
        .await
        .unwrap();

    let err = registry.set_alias("churn", "staging", 9).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionNotFound { version: 9, .. }));
    assert!(registry.resolve_alias("churn", "staging").await.unwrap().is_none());
}

#[tokio::test]
async fn registry_set_alias_unknown_model_fails() {
    let registry = MemoryModelRegistry::new();
    let err = registry.set_alias("ghost", "staging", 1).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionNotFound { version: 1, .. }));

    let err = registry
        .compare_and_set_alias("ghost", "staging", None, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::VersionNotFound { version: 1, .. }));
}

#[tokio::test]
async fn registry_rebind_to_same_version_records_nothing() {
    let registry = MemoryModelRegistry::new();
    let d = ContentDigest::from_bytes(b"a");
    registry.register("churn", &d, None).await.unwrap();
    registry.register("churn", &d, None).await.unwrap();

    registry.set_alias("churn", "production", 1).await.unwrap();
    registry.set_alias("churn", "production", 2).await.unwrap();
    assert_eq!(
        registry.set_alias("churn", "production", 2).await.unwrap(),
        Some(2)
    );
    assert_eq!(
        registry
            .compare_and_set_alias("churn", "production", Some(2), 2)
            .await
            .unwrap(),
        Some(2)
    );

    let history = registry.alias_history("churn", "production").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 2);
    assert_eq!(history[0].previous, Some(1));
}

#[tokio::test]
async fn registry_rebind_archives_previous_version() {
    let registry = MemoryModelRegistry::new();
    let d = ContentDigest::from_bytes(b"a");
    registry.register("churn", &d, None).await.unwrap();
    registry.register("churn", &d, None).await.unwrap();

    assert_eq!(registry.set_alias("churn", "staging", 1).await.unwrap(), None);
    assert_eq!(
        registry.set_alias("churn", "staging", 2).await.unwrap(),
        Some(1)
    );

    let v1 = registry.get_version("churn", 1).await.unwrap();
    let v2 = registry.get_version("churn", 2).await.unwrap();
    assert_eq!(v1.status, VersionStatus::Archived);
    assert_eq!(v2.status, VersionStatus::Active);
}

#[tokio::test]
async fn registry_rebind_keeps_version_bound_elsewhere_active() {
    let registry = MemoryModelRegistry::new();
    let d = ContentDigest::from_bytes(b"a");
    registry.register("churn", &d, None).await.unwrap();
    registry.register("churn", &d, None).await.unwrap();

    registry.set_alias("churn", "staging", 1).await.unwrap();
    registry.set_alias("churn", "production", 1).await.unwrap();
    registry.set_alias("churn", "staging", 2).await.unwrap();

    let v1 = registry.get_version("churn", 1).await.unwrap();
    assert_eq!(v1.status, VersionStatus::Active);
}

#[tokio::test]
async fn registry_cas_rejects_stale_expectation() {
    let registry = MemoryModelRegistry::new();
    let d = ContentDigest::from_bytes(b"a");
    for _ in 0..3 {
        registry.register("churn", &d, None).await.unwrap();
    }
    registry.set_alias("churn", "production", 1).await.unwrap();
    registry.set_alias("churn", "production", 2).await.unwrap();

    let err = registry
        .compare_and_set_alias("churn", "production", Some(1), 3)
        .await
        .unwrap_err();
    match err {
        StorageError::AliasConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, Some(1));
            assert_eq!(actual, Some(2));
        }
        other => panic!("expected AliasConflict, got {other:?}"),
    }

    let current = registry
        .resolve_alias("churn", "production")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.version, 2);
}

#[tokio::test]
async fn registry_cas_from_unbound() {
    let registry = MemoryModelRegistry::new();
    registry
        .register("churn", &ContentDigest::from_bytes(b"a"), None)
        .await
        .unwrap();

    let previous = registry
        .compare_and_set_alias("churn", "production", None, 1)
        .await
        .unwrap();
    assert_eq!(previous, None);
}

#[tokio::test]
async fn registry_history_newest_first() {
    let registry = MemoryModelRegistry::new();
    let d = ContentDigest::from_bytes(b"a");
    registry.register("churn", &d, None).await.unwrap();
    registry.register("churn", &d, None).await.unwrap();
    registry.set_alias("churn", "production", 1).await.unwrap();
    registry.set_alias("churn", "production", 2).await.unwrap();
    registry.set_alias("churn", "staging", 2).await.unwrap();

    let history = registry.alias_history("churn", "production").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 2);
    assert_eq!(history[0].previous, Some(1));
    assert_eq!(history[1].version, 1);
    assert_eq!(history[1].previous, None);

    let aliases = registry.list_aliases("churn").await.unwrap();
    let names: Vec<_> = aliases.iter().map(|a| a.alias.as_str()).collect();
    assert_eq!(names, vec!["production", "staging"]);
}
