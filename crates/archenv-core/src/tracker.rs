//! Cross-environment tracking
//!
//! A version promoted from another environment records that environment and
//! the hash it was promoted at. Comparing the record with the source's
//! current hash tells whether the tracking environment has drifted.

use crate::error::CoreError;
use archenv_store::{
    ArchitectureStore, EnvironmentKey, EnvironmentVersion, SnapshotStore,
};
use archenv_topology::{diff, Topology, TopologyDiff, VersionHash};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of [`EnvironmentTracker::is_in_sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Tracked hash equals the base's current hash
    pub in_sync: bool,
    /// Base environment's current hash
    pub expected_hash: VersionHash,
    /// Hash recorded on the tracking environment's current version
    pub actual_hash: VersionHash,
}

/// Sync checker over injected stores
#[derive(Clone)]
pub struct EnvironmentTracker {
    store: Arc<dyn ArchitectureStore>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl std::fmt::Debug for EnvironmentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentTracker").finish_non_exhaustive()
    }
}

impl EnvironmentTracker {
    /// Create a tracker
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn ArchitectureStore>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { store, snapshots }
    }

    /// Whether `environment` is in sync with `base`
    ///
    /// # Errors
    /// - not-found if either environment or its current version is missing
    /// - `NotTracked` if `environment`'s current version tracks nothing
    /// - `TrackingMismatch` if it tracks an environment other than `base`
    pub async fn is_in_sync(
        &self,
        architecture: &str,
        base: &str,
        environment: &str,
    ) -> Result<SyncStatus, CoreError> {
        let base_key = EnvironmentKey::new(architecture, base);
        let env_key = EnvironmentKey::new(architecture, environment);

        let base_version = self.store.get_current(&base_key).await?;
        let env_version = self.store.get_current(&env_key).await?;

        let tracks = env_version
            .tracks()
            .ok_or_else(|| CoreError::NotTracked(env_key.clone()))?;
        if tracks.environment != base {
            return Err(CoreError::TrackingMismatch {
                environment: env_key,
                expected: base.to_owned(),
                actual: tracks.environment.clone(),
            });
        }

        let status = SyncStatus {
            in_sync: tracks.version_hash == base_version.version_hash,
            expected_hash: base_version.version_hash,
            actual_hash: tracks.version_hash,
        };
        tracing::debug!(
            environment = %env_key,
            base,
            in_sync = status.in_sync,
            expected = %status.expected_hash.short(),
            actual = %status.actual_hash.short(),
            "checked sync"
        );
        Ok(status)
    }

    /// Structural diff of `environment`'s current snapshot against `base`'s
    ///
    /// # Errors
    /// - not-found if either environment or its current version is missing
    /// - `SnapshotMissing` if a version's snapshot was never written
    /// - `Topology` if a snapshot does not parse
    pub async fn diff_environments(
        &self,
        architecture: &str,
        base: &str,
        environment: &str,
        include_properties: bool,
    ) -> Result<TopologyDiff, CoreError> {
        let base_version = self
            .store
            .get_current(&EnvironmentKey::new(architecture, base))
            .await?;
        let env_version = self
            .store
            .get_current(&EnvironmentKey::new(architecture, environment))
            .await?;

        let base_topology = self.load_topology(&base_version).await?;
        let env_topology = self.load_topology(&env_version).await?;

        let result = diff(&env_topology, &base_topology, include_properties);
        tracing::debug!(
            architecture,
            base,
            environment,
            resources = result.resources.len(),
            edges = result.edges.len(),
            "diffed environments"
        );
        Ok(result)
    }

    /// Raw snapshot bytes of a version
    pub(crate) async fn load_snapshot(
        &self,
        version: &EnvironmentVersion,
    ) -> Result<Vec<u8>, CoreError> {
        let key = version.key();
        self.snapshots
            .get_snapshot(&key)
            .await?
            .ok_or(CoreError::SnapshotMissing(key))
    }

    /// Parsed snapshot of a version
    pub(crate) async fn load_topology(
        &self,
        version: &EnvironmentVersion,
    ) -> Result<Topology, CoreError> {
        let bytes = self.load_snapshot(version).await?;
        Ok(Topology::from_slice(&bytes)?)
    }
}
