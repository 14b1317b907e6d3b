//! Environment manager
//!
//! Orchestrates every version-producing operation: environment creation,
//! cloning, engine runs, promotion and rollback. Each operation builds the
//! new version completely and writes its snapshot before a single append;
//! `current` moves afterwards by compare-and-set against the version the
//! operation started from. A failure at any earlier step leaves the
//! environment untouched.

use crate::config::ManagerConfig;
use crate::engine::{Engine, EngineRequest};
use crate::error::CoreError;
use crate::gate;
use crate::tracker::{EnvironmentTracker, SyncStatus};
use archenv_store::{
    ArchitectureStore, Constraint, Environment, EnvironmentKey, EnvironmentTags,
    EnvironmentVersion, ResourceConfiguration, SnapshotStore, StoreError, Tracks, VersionKey,
};
use archenv_topology::{diff, Topology, TopologyDiff, VersionHash};
use std::sync::Arc;

/// One engine run against an environment
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub architecture: String,
    pub environment: String,
    /// Version the caller believes is current
    pub expected_version: u64,
    pub constraints: Vec<Constraint>,
    pub created_by: String,
    /// Discard versions newer than `expected_version` when it is not the latest
    pub overwrite: bool,
}

impl RunRequest {
    /// Create a request with no constraints
    #[must_use]
    pub fn new(
        architecture: impl Into<String>,
        environment: impl Into<String>,
        expected_version: u64,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            architecture: architecture.into(),
            environment: environment.into(),
            expected_version,
            constraints: Vec::new(),
            created_by: created_by.into(),
            overwrite: false,
        }
    }

    /// With constraints
    #[inline]
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// With overwrite
    #[inline]
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn key(&self) -> EnvironmentKey {
        EnvironmentKey::new(self.architecture.clone(), self.environment.clone())
    }
}

/// Fields of a version about to be appended
struct Draft<'a> {
    key: &'a EnvironmentKey,
    base: Option<u64>,
    replace_future: bool,
    snapshot: &'a [u8],
    created_by: &'a str,
    constraints: Vec<Constraint>,
    configuration: ResourceConfiguration,
}

/// Environment lifecycle orchestrator
pub struct EnvironmentManager {
    store: Arc<dyn ArchitectureStore>,
    snapshots: Arc<dyn SnapshotStore>,
    engine: Arc<dyn Engine>,
    tracker: EnvironmentTracker,
    config: ManagerConfig,
}

impl std::fmt::Debug for EnvironmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EnvironmentManager {
    /// Create a manager over injected ports
    #[must_use]
    pub fn new(
        store: Arc<dyn ArchitectureStore>,
        snapshots: Arc<dyn SnapshotStore>,
        engine: Arc<dyn Engine>,
        config: ManagerConfig,
    ) -> Self {
        let tracker = EnvironmentTracker::new(store.clone(), snapshots.clone());
        Self {
            store,
            snapshots,
            engine,
            tracker,
            config,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Sync checker sharing this manager's stores
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &EnvironmentTracker {
        &self.tracker
    }

    /// Create an environment with version 0
    ///
    /// Without `initial_snapshot` the environment starts empty.
    ///
    /// # Errors
    /// - `Topology` if the snapshot does not parse
    /// - `EnvironmentExists` if the id is taken
    pub async fn create_environment(
        &self,
        architecture: &str,
        id: &str,
        tags: EnvironmentTags,
        created_by: &str,
        initial_snapshot: Option<&[u8]>,
    ) -> Result<EnvironmentVersion, CoreError> {
        let snapshot = initial_snapshot.unwrap_or_default();
        Topology::from_slice(snapshot)?;

        let environment = Environment::new(architecture, id, tags);
        let key = environment.key();
        self.store.create_environment(environment).await?;
        tracing::info!(environment = %key, "created environment");

        let committed = self
            .commit(Draft {
                key: &key,
                base: None,
                replace_future: false,
                snapshot,
                created_by,
                constraints: Vec::new(),
                configuration: ResourceConfiguration::default(),
            })
            .await;
        self.discard_on_error(&key, committed).await
    }

    /// Create `new_id` from `source`'s current snapshot, tracking `source`
    ///
    /// # Errors
    /// - not-found if `source` or its current version is missing
    /// - `SnapshotMissing` if its snapshot was never written
    /// - `EnvironmentExists` if `new_id` is taken
    pub async fn clone_environment(
        &self,
        architecture: &str,
        source: &str,
        new_id: &str,
        tags: EnvironmentTags,
        created_by: &str,
    ) -> Result<EnvironmentVersion, CoreError> {
        let source_version = self
            .store
            .get_current(&EnvironmentKey::new(architecture, source))
            .await?;
        let snapshot = self.tracker.load_snapshot(&source_version).await?;

        let environment = Environment::new(architecture, new_id, tags);
        let key = environment.key();
        self.store.create_environment(environment).await?;
        tracing::info!(
            environment = %key,
            source,
            hash = %source_version.version_hash.short(),
            "cloned environment"
        );

        let committed = self
            .commit(Draft {
                key: &key,
                base: None,
                replace_future: false,
                snapshot: &snapshot,
                created_by,
                constraints: Vec::new(),
                configuration: ResourceConfiguration {
                    tracks: Some(Tracks::new(source, source_version.version_hash)),
                    diff: Some(TopologyDiff::new()),
                    ..ResourceConfiguration::default()
                },
            })
            .await;
        self.discard_on_error(&key, committed).await
    }

    /// Run the engine and append the result
    ///
    /// # Workflow
    /// 1. Check `expected_version` against `current`
    /// 2. Screen constraints (static gate)
    /// 3. Refuse a non-latest base unless overwriting
    /// 4. Invoke the engine on the current snapshot
    /// 5. Screen the realized diff (dynamic gate)
    /// 6. Carry tracking and overrides forward
    /// 7. Prune newer versions when overwriting
    /// 8. Append and move `current`
    ///
    /// Steps 7 and 8 are one store operation, so a failed append leaves
    /// every existing version and `current` as they were.
    ///
    /// # Errors
    /// - `StaleVersion` if `expected_version` is not current
    /// - `TopologicalChangesNotAllowed` from either gate check
    /// - `VersionConflict` if newer versions exist and `overwrite` is false
    /// - `Engine` or `Topology` if the engine fails or emits an unparsable snapshot
    pub async fn run(&self, request: RunRequest) -> Result<EnvironmentVersion, CoreError> {
        let key = request.key();
        tracing::info!(
            environment = %key,
            expected = request.expected_version,
            constraints = request.constraints.len(),
            "starting run"
        );

        // 1. Expected version must still be current
        let environment = self.store.get_environment(&key).await?;
        let current = environment
            .current
            .ok_or_else(|| StoreError::NoCurrentVersion(key.clone()))?;
        if current != request.expected_version {
            return Err(CoreError::StaleVersion {
                environment: key,
                expected: request.expected_version,
                actual: current,
            });
        }

        // 2. Static gate
        gate::check_constraints(&environment, &request.constraints)?;

        // 3. History stays linear
        let latest = self
            .store
            .get_latest(&key)
            .await?
            .map_or(current, |v| v.version);
        if latest != current && !request.overwrite {
            return Err(CoreError::VersionConflict {
                environment: key,
                current,
                latest,
            });
        }

        // 4. Engine
        let base = self.store.get(&key.version(current)).await?;
        let input_snapshot = self.tracker.load_snapshot(&base).await?;
        let input = Topology::from_slice(&input_snapshot)?;
        let output = self
            .engine
            .run(EngineRequest {
                architecture: request.architecture.clone(),
                environment: request.environment.clone(),
                input_snapshot,
                constraints: request.constraints.clone(),
            })
            .await?;
        let generated = Topology::from_slice(&output.snapshot)?;

        // 5. Dynamic gate
        let realized = diff(&generated, &input, false);
        tracing::debug!(
            environment = %key,
            resources = realized.resources.len(),
            edges = realized.edges.len(),
            "realized diff"
        );
        gate::check_diff(&environment, &realized)?;

        // 6. Tracking
        let tracks = base.tracks().cloned();
        let tracked_diff = match &tracks {
            Some(tracks) => self.tracked_diff(&key, tracks, &generated).await?,
            None => None,
        };
        let configuration = ResourceConfiguration {
            tracks,
            overrides: base.resource_configuration.overrides.clone(),
            diff: tracked_diff,
            config_errors: output.config_errors,
        };

        // 7-8. Append, replacing newer versions in the same store call
        self.commit(Draft {
            key: &key,
            base: Some(current),
            replace_future: latest != current,
            snapshot: &output.snapshot,
            created_by: &request.created_by,
            constraints: request.constraints,
            configuration,
        })
        .await
    }

    /// Append `source`'s current snapshot to `target`
    ///
    /// `target` must already track `source`. The engine is not involved, so
    /// the dynamic gate does not apply. A target already in sync is left
    /// unchanged and its current version returned.
    ///
    /// # Errors
    /// - `NotTracked` / `TrackingMismatch` if `target` does not track `source`
    /// - `VersionConflict` if `target`'s current version is not its latest
    pub async fn promote(
        &self,
        architecture: &str,
        source: &str,
        target: &str,
        created_by: &str,
    ) -> Result<EnvironmentVersion, CoreError> {
        let source_version = self
            .store
            .get_current(&EnvironmentKey::new(architecture, source))
            .await?;
        let key = EnvironmentKey::new(architecture, target);
        let target_version = self.store.get_current(&key).await?;

        let tracks = target_version
            .tracks()
            .ok_or_else(|| CoreError::NotTracked(key.clone()))?;
        if tracks.environment != source {
            return Err(CoreError::TrackingMismatch {
                environment: key,
                expected: source.to_owned(),
                actual: tracks.environment.clone(),
            });
        }
        if tracks.version_hash == source_version.version_hash {
            tracing::info!(environment = %key, source, "already in sync");
            return Ok(target_version);
        }

        let current = target_version.version;
        if let Some(latest) = self.store.get_latest(&key).await? {
            if latest.version != current {
                return Err(CoreError::VersionConflict {
                    environment: key,
                    current,
                    latest: latest.version,
                });
            }
        }

        let snapshot = self.tracker.load_snapshot(&source_version).await?;
        let promoted = self
            .commit(Draft {
                key: &key,
                base: Some(current),
                replace_future: false,
                snapshot: &snapshot,
                created_by,
                constraints: Vec::new(),
                configuration: ResourceConfiguration {
                    tracks: Some(Tracks::new(source, source_version.version_hash)),
                    overrides: target_version.resource_configuration.overrides.clone(),
                    diff: Some(TopologyDiff::new()),
                    config_errors: Vec::new(),
                },
            })
            .await?;
        tracing::info!(
            environment = %key,
            source,
            from = %tracks.version_hash.short(),
            to = %source_version.version_hash.short(),
            "promoted"
        );
        Ok(promoted)
    }

    /// Point `current` at an existing version (rollback or roll-forward)
    ///
    /// # Errors
    /// - `VersionNotFound` if `version` does not exist
    /// - `StaleVersion` if `current` moved concurrently
    pub async fn set_current(
        &self,
        architecture: &str,
        environment: &str,
        version: u64,
    ) -> Result<Environment, CoreError> {
        let key = EnvironmentKey::new(architecture, environment);
        let existing = self.store.get_environment(&key).await?;
        let updated = self.store.set_current(&key, existing.current, version).await?;
        tracing::info!(environment = %key, from = ?existing.current, to = version, "moved current");
        Ok(updated)
    }

    /// Record where the IaC rendering of a version lives
    ///
    /// # Errors
    /// `VersionNotFound` if the version does not exist
    pub async fn attach_iac_location(
        &self,
        architecture: &str,
        environment: &str,
        version: u64,
        location: impl Into<String>,
    ) -> Result<EnvironmentVersion, CoreError> {
        let key = EnvironmentKey::new(architecture, environment).version(version);
        let mut record = self.store.get(&key).await?;
        record.iac_location = Some(location.into());
        self.store.update(record.clone()).await?;
        tracing::debug!(version = %key, "attached IaC location");
        Ok(record)
    }

    /// All versions of an environment, ascending
    ///
    /// # Errors
    /// `EnvironmentNotFound` if the environment does not exist
    pub async fn list_versions(
        &self,
        architecture: &str,
        environment: &str,
    ) -> Result<Vec<EnvironmentVersion>, CoreError> {
        Ok(self
            .store
            .list(&EnvironmentKey::new(architecture, environment))
            .await?)
    }

    /// One version
    ///
    /// # Errors
    /// `VersionNotFound` if absent
    pub async fn get_version(
        &self,
        architecture: &str,
        environment: &str,
        version: u64,
    ) -> Result<EnvironmentVersion, CoreError> {
        Ok(self
            .store
            .get(&EnvironmentKey::new(architecture, environment).version(version))
            .await?)
    }

    /// Version the environment's `current` pointer references
    ///
    /// # Errors
    /// Not-found if the environment, its pointer or the version is missing
    pub async fn get_current(
        &self,
        architecture: &str,
        environment: &str,
    ) -> Result<EnvironmentVersion, CoreError> {
        Ok(self
            .store
            .get_current(&EnvironmentKey::new(architecture, environment))
            .await?)
    }

    /// All environments of an architecture
    ///
    /// # Errors
    /// Store failures only
    pub async fn list_environments(&self, architecture: &str) -> Result<Vec<Environment>, CoreError> {
        Ok(self.store.list_environments(architecture).await?)
    }

    /// Current snapshot of an environment, parsed
    ///
    /// # Errors
    /// Not-found, `SnapshotMissing` or `Topology`
    pub async fn current_topology(
        &self,
        architecture: &str,
        environment: &str,
    ) -> Result<Topology, CoreError> {
        let version = self.get_current(architecture, environment).await?;
        self.tracker.load_topology(&version).await
    }

    /// See [`EnvironmentTracker::is_in_sync`]
    ///
    /// # Errors
    /// As [`EnvironmentTracker::is_in_sync`]
    pub async fn is_in_sync(
        &self,
        architecture: &str,
        base: &str,
        environment: &str,
    ) -> Result<SyncStatus, CoreError> {
        self.tracker.is_in_sync(architecture, base, environment).await
    }

    /// Sync status against the configured default environment
    ///
    /// # Errors
    /// As [`EnvironmentTracker::is_in_sync`]
    pub async fn sync_status(
        &self,
        architecture: &str,
        environment: &str,
    ) -> Result<SyncStatus, CoreError> {
        self.tracker
            .is_in_sync(architecture, &self.config.default_environment, environment)
            .await
    }

    /// See [`EnvironmentTracker::diff_environments`]
    ///
    /// # Errors
    /// As [`EnvironmentTracker::diff_environments`]
    pub async fn diff_environments(
        &self,
        architecture: &str,
        base: &str,
        environment: &str,
        include_properties: bool,
    ) -> Result<TopologyDiff, CoreError> {
        self.tracker
            .diff_environments(architecture, base, environment, include_properties)
            .await
    }

    /// Diff of a generated topology against the snapshot it tracks
    ///
    /// `None` when the tracked version has since been pruned.
    async fn tracked_diff(
        &self,
        key: &EnvironmentKey,
        tracks: &Tracks,
        generated: &Topology,
    ) -> Result<Option<TopologyDiff>, CoreError> {
        let source = EnvironmentKey::new(key.architecture.clone(), tracks.environment.clone());
        let Some(tracked) = self.store.find_by_hash(&source, &tracks.version_hash).await? else {
            tracing::warn!(
                environment = %key,
                tracked = %source,
                hash = %tracks.version_hash.short(),
                "tracked version no longer exists"
            );
            return Ok(None);
        };
        let tracked = self.tracker.load_topology(&tracked).await?;
        Ok(Some(diff(
            generated,
            &tracked,
            self.config.include_properties_in_tracked_diff,
        )))
    }

    /// Write the snapshot, append the version, then move `current`
    async fn commit(&self, draft: Draft<'_>) -> Result<EnvironmentVersion, CoreError> {
        let number = draft.base.map_or(0, |n| n + 1);
        let version_key = draft.key.version(number);

        // Snapshot of the version about to be replaced, restored if the append fails
        let displaced = if draft.replace_future {
            self.snapshots.get_snapshot(&version_key).await?
        } else {
            None
        };

        let (version, pruned) = match self.append(&draft, version_key.clone()).await {
            Ok(appended) => appended,
            Err(err) => {
                if let Some(bytes) = displaced {
                    if let Err(restore) = self.snapshots.write_snapshot(&version_key, &bytes).await {
                        tracing::error!(
                            version = %version_key,
                            error = %restore,
                            "failed to restore replaced snapshot"
                        );
                    }
                }
                return Err(err);
            }
        };
        if pruned > 0 {
            tracing::info!(environment = %draft.key, above = ?draft.base, pruned, "discarded newer versions");
        }

        self.store.set_current(draft.key, draft.base, number).await?;

        tracing::info!(
            environment = %draft.key,
            version = number,
            hash = %version.version_hash.short(),
            created_by = draft.created_by,
            "appended version"
        );
        Ok(version)
    }

    /// Write the snapshot and append the record; returns the pruned count
    async fn append(
        &self,
        draft: &Draft<'_>,
        version_key: VersionKey,
    ) -> Result<(EnvironmentVersion, usize), CoreError> {
        let location = self
            .snapshots
            .write_snapshot(&version_key, draft.snapshot)
            .await?;
        let version = EnvironmentVersion::new(
            version_key,
            VersionHash::of_snapshot(draft.snapshot),
            draft.created_by,
            location,
        )
        .with_constraints(draft.constraints.clone())
        .with_resource_configuration(draft.configuration.clone());

        let pruned = if draft.replace_future {
            self.store.replace_future_versions(version.clone()).await?
        } else {
            self.store.add(version.clone()).await?;
            0
        };
        Ok((version, pruned))
    }

    /// Remove a freshly created environment whose first version failed
    async fn discard_on_error(
        &self,
        key: &EnvironmentKey,
        committed: Result<EnvironmentVersion, CoreError>,
    ) -> Result<EnvironmentVersion, CoreError> {
        if committed.is_err() {
            if let Err(cleanup) = self.store.delete_environment(key).await {
                tracing::error!(environment = %key, error = %cleanup, "failed to discard environment");
            } else {
                tracing::warn!(environment = %key, "discarded environment after failed first version");
            }
        }
        committed
    }
}
