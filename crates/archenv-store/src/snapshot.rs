//! Snapshot blob storage
//!
//! Snapshots are opaque YAML documents written once per version. The
//! returned location string is recorded as the version's `state_location`.

use crate::error::StoreError;
use crate::version::VersionKey;
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File name used by [`FsSnapshotStore`] inside each version directory
pub const SNAPSHOT_FILE: &str = "state.yaml";

/// Snapshot blob port
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read a version's snapshot; `None` if it was never written
    ///
    /// # Errors
    /// `Io` on read failure
    async fn get_snapshot(&self, key: &VersionKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a version's snapshot, returning its location
    ///
    /// # Errors
    /// `Io` on write failure
    async fn write_snapshot(&self, key: &VersionKey, bytes: &[u8]) -> Result<String, StoreError>;
}

/// Snapshot store held in memory
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    blobs: DashMap<VersionKey, Vec<u8>>,
}

impl InMemorySnapshotStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether nothing has been written
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Location string for a key
    #[must_use]
    pub fn location(key: &VersionKey) -> String {
        format!(
            "memory://{}/{}/{}",
            key.architecture, key.environment, key.version
        )
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_snapshot(&self, key: &VersionKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(key).map(|blob| blob.clone()))
    }

    async fn write_snapshot(&self, key: &VersionKey, bytes: &[u8]) -> Result<String, StoreError> {
        self.blobs.insert(key.clone(), bytes.to_vec());
        Ok(Self::location(key))
    }
}

/// Snapshot store rooted in a directory
///
/// Layout: `<root>/<architecture>/<environment>/<version>/state.yaml`.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    /// Create a store rooted at `root`; directories are created on write
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a version's snapshot file
    ///
    /// # Errors
    /// `InvalidId` if the architecture or environment id would escape `root`
    pub fn path_for(&self, key: &VersionKey) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join(path_segment(&key.architecture)?)
            .join(path_segment(&key.environment)?)
            .join(key.version.to_string())
            .join(SNAPSHOT_FILE))
    }
}

/// Accept `id` only if it names exactly one directory below its parent
fn path_segment(id: &str) -> Result<&str, StoreError> {
    let reason = if id.is_empty() {
        "empty"
    } else if id == "." || id == ".." {
        "relative path component"
    } else if id.contains(['/', '\\', '\0']) {
        "contains a path separator or NUL"
    } else {
        return Ok(id);
    };
    Err(StoreError::InvalidId {
        id: id.to_owned(),
        reason,
    })
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn get_snapshot(&self, key: &VersionKey) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_snapshot(&self, key: &VersionKey, bytes: &[u8]) -> Result<String, StoreError> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(version = %key, path = %path.display(), bytes = bytes.len(), "wrote snapshot");
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::EnvironmentKey;

    fn key(n: u64) -> VersionKey {
        EnvironmentKey::new("shop", "staging").version(n)
    }

    #[tokio::test]
    async fn memory_store_locations() {
        let store = InMemorySnapshotStore::new();
        let location = store.write_snapshot(&key(2), b"resources: {}").await.unwrap();
        assert_eq!(location, "memory://shop/staging/2");
        assert_eq!(
            store.get_snapshot(&key(2)).await.unwrap().as_deref(),
            Some(&b"resources: {}"[..])
        );
        assert!(store.get_snapshot(&key(3)).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn fs_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());

        let location = store.write_snapshot(&key(0), b"edges: {}\n").await.unwrap();
        let expected = dir.path().join("shop/staging/0/state.yaml");
        assert!(expected.exists());
        assert!(location.ends_with("shop/staging/0/state.yaml"));

        let read = store.get_snapshot(&key(0)).await.unwrap().unwrap();
        assert_eq!(read, b"edges: {}\n");
    }

    #[tokio::test]
    async fn fs_store_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        assert!(store.get_snapshot(&key(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_store_rejects_ids_escaping_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("snapshots");
        let store = FsSnapshotStore::new(&root);

        for (architecture, environment) in [
            ("shop", "../../x"),
            ("..", "prod"),
            ("shop", "a/b"),
            ("shop", "a\\b"),
            ("", "prod"),
        ] {
            let key = EnvironmentKey::new(architecture, environment).version(0);
            let err = store.write_snapshot(&key, b"x").await.unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidId { .. }),
                "{architecture}/{environment}: {err}"
            );
            assert!(matches!(
                store.get_snapshot(&key).await,
                Err(StoreError::InvalidId { .. })
            ));
        }
        assert!(!dir.path().join("x").exists());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn fs_store_io_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("shop");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = FsSnapshotStore::new(dir.path());
        let err = store.write_snapshot(&key(0), b"x").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
