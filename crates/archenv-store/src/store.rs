//! Storage ports for environments and their version history
//!
//! Implementations guard their own data structures but do not serialize
//! logical operations: at most one version-producing operation may be in
//! flight per environment, and callers are responsible for that.

use crate::error::StoreError;
use crate::version::{Environment, EnvironmentKey, EnvironmentVersion, VersionKey};
use archenv_topology::VersionHash;
use async_trait::async_trait;

/// Append-only, per-environment ordered version history
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Append a version
    ///
    /// The caller supplies the next contiguous number (latest + 1, or 0).
    ///
    /// # Errors
    /// - `EnvironmentNotFound` if the environment does not exist
    /// - `VersionExists` on key collision
    /// - `NonContiguous` if the number would leave a gap
    async fn add(&self, version: EnvironmentVersion) -> Result<(), StoreError>;

    /// Fetch one version
    ///
    /// # Errors
    /// `VersionNotFound` if absent
    async fn get(&self, key: &VersionKey) -> Result<EnvironmentVersion, StoreError>;

    /// All versions of an environment, ascending
    ///
    /// # Errors
    /// `EnvironmentNotFound` if the environment does not exist
    async fn list(&self, environment: &EnvironmentKey)
        -> Result<Vec<EnvironmentVersion>, StoreError>;

    /// Highest-numbered version
    async fn get_latest(
        &self,
        environment: &EnvironmentKey,
    ) -> Result<Option<EnvironmentVersion>, StoreError>;

    /// Nearest version numbered below `version`
    async fn get_previous(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<Option<EnvironmentVersion>, StoreError>;

    /// Nearest version numbered above `version`
    async fn get_next(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<Option<EnvironmentVersion>, StoreError>;

    /// Hard-delete every version numbered above `version`
    ///
    /// If the environment's current pointer referenced a deleted version it
    /// is pulled back to `version`. Returns the number of deleted versions.
    async fn delete_future_versions(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<usize, StoreError>;

    /// Hard-delete every version numbered at or above `version.version` and
    /// append `version` in their place, as one operation
    ///
    /// Nothing changes when the append is rejected. A current pointer that
    /// referenced a deleted version is pulled back to the version below.
    /// Returns the number of deleted versions.
    ///
    /// # Errors
    /// - `EnvironmentNotFound` if the environment does not exist
    /// - `NonContiguous` if the versions kept below would leave a gap
    async fn replace_future_versions(&self, version: EnvironmentVersion)
        -> Result<usize, StoreError>;

    /// Replace a version by key
    ///
    /// # Errors
    /// `Immutable` if anything other than `iac_location` differs
    async fn update(&self, version: EnvironmentVersion) -> Result<(), StoreError>;

    /// Most recent version carrying `hash`
    async fn find_by_hash(
        &self,
        environment: &EnvironmentKey,
        hash: &VersionHash,
    ) -> Result<Option<EnvironmentVersion>, StoreError>;
}

/// Environment records and their current pointers
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    /// Register a new environment
    ///
    /// # Errors
    /// `EnvironmentExists` if the id is taken
    async fn create_environment(&self, environment: Environment) -> Result<(), StoreError>;

    /// Remove an environment record together with its version history
    ///
    /// # Errors
    /// `EnvironmentNotFound` if absent
    async fn delete_environment(&self, key: &EnvironmentKey) -> Result<(), StoreError>;

    /// Fetch an environment
    async fn get_environment(&self, key: &EnvironmentKey) -> Result<Environment, StoreError>;

    /// All environments of an architecture, sorted by id
    async fn list_environments(&self, architecture: &str) -> Result<Vec<Environment>, StoreError>;

    /// Move the current pointer if it still equals `expected`
    ///
    /// # Errors
    /// - `StaleVersion` if the pointer moved
    /// - `VersionNotFound` if `new` does not exist
    async fn set_current(
        &self,
        key: &EnvironmentKey,
        expected: Option<u64>,
        new: u64,
    ) -> Result<Environment, StoreError>;
}

/// Combined store with pointer resolution
#[async_trait]
pub trait ArchitectureStore: VersionStore + EnvironmentStore {
    /// Version the environment's current pointer references
    ///
    /// # Errors
    /// Not-found if the environment, its pointer, or the version is missing
    async fn get_current(&self, key: &EnvironmentKey) -> Result<EnvironmentVersion, StoreError> {
        let environment = self.get_environment(key).await?;
        let version = environment
            .current
            .ok_or_else(|| StoreError::NoCurrentVersion(key.clone()))?;
        self.get(&key.version(version)).await
    }
}

impl<T: VersionStore + EnvironmentStore> ArchitectureStore for T {}
