use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{ArtifactStore, ContentDigest, StorageResult};

/// Filesystem-backed artifact store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    objects_dir: PathBuf,
}

impl FsArtifactStore {
    /// Create a new `FsArtifactStore` rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn blob_path(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.as_str();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }
}

fn write_blob(path: &Path, data: &[u8]) -> StorageResult<()> {
    if path.exists() {
        return Ok(());
    }
    let shard_dir = path
        .parent()
        .ok_or_else(|| StorageError::Backend(format!("blob path has no parent: {path:?}")))?;
    fs::create_dir_all(shard_dir)?;

    // Write to a temp file in the same directory, then rename into place.
    let mut tmp = NamedTempFile::new_in(shard_dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, data: &[u8]) -> StorageResult<ContentDigest> {
        let digest = ContentDigest::from_bytes(data);
        let path = self.blob_path(&digest);
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || write_blob(&path, &data))
            .await
            .map_err(|e| StorageError::Backend(format!("artifact write task failed: {e}")))??;

        debug!(digest = %digest.short(), "artifact stored");
        Ok(digest)
    }

    async fn get(&self, digest: &ContentDigest) -> StorageResult<Vec<u8>> {
        let path = self.blob_path(digest);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    digest: digest.as_str().to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn contains(&self, digest: &ContentDigest) -> StorageResult<bool> {
        let path = self.blob_path(digest);
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn blob_roundtrip() {
        let (_dir, store) = make_store();
        let data = br#"{"encoder":{},"estimator":{}}"#;
        let digest = store.put(data).await.unwrap();
        let got = store.get(&digest).await.unwrap();
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn dedupe_invariant() {
        let (dir, store) = make_store();
        let data = b"duplicate me";
        let d1 = store.put(data).await.unwrap();
        let d2 = store.put(data).await.unwrap();
        assert_eq!(d1, d2);

        // Verify single file on disk.
        let hex = d1.as_str();
        let shard = dir.path().join("objects").join(&hex[..2]);
        let entries: Vec<_> = std::fs::read_dir(shard).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn get_nonexistent_returns_not_found() {
        let (_dir, store) = make_store();
        let fake = ContentDigest::from_bytes(b"no such blob");
        match store.get(&fake).await {
            Err(StorageError::NotFound { digest }) => assert_eq!(digest, fake.as_str()),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn contains_tracks_puts() {
        let (_dir, store) = make_store();
        let digest = store.put(b"exists check").await.unwrap();
        assert!(store.contains(&digest).await.unwrap());
        assert!(!store
            .contains(&ContentDigest::from_bytes(b"missing"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let digest = {
            let store = FsArtifactStore::new(dir.path()).unwrap();
            store.put(b"persisted pipeline").await.unwrap()
        };
        let reopened = FsArtifactStore::new(dir.path()).unwrap();
        assert_eq!(
            reopened.get(&digest).await.unwrap(),
            b"persisted pipeline".to_vec()
        );
    }
}
