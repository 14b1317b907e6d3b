//! Testing utilities for the archenv workspace
//!
//! Shared snapshot builders, a scripted engine, and manager fixtures.

#![allow(missing_docs)]

use archenv_core::{
    Engine, EngineError, EngineOutput, EngineRequest, EnvironmentManager, ManagerConfig,
};
use archenv_store::{
    Environment, EnvironmentKey, EnvironmentStore, EnvironmentTags, EnvironmentVersion,
    InMemorySnapshotStore, InMemoryStore, SnapshotStore, StoreError, VersionKey, VersionStore,
};
use archenv_topology::{
    Edge, PropertyMap, PropertyValue, Resource, ResourceId, Topology, VersionHash,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const ARCHITECTURE: &str = "shop";
pub const DEFAULT_ENV: &str = "default";
pub const PROD_ENV: &str = "prod";

/// Fluent snapshot builder
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    resources: Vec<Resource>,
    edges: Vec<Edge>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(self, id: &str) -> Self {
        self.resource_with(id, &[])
    }

    pub fn resource_with(mut self, id: &str, properties: &[(&str, PropertyValue)]) -> Self {
        let properties: PropertyMap = properties
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        self.resources
            .push(Resource::new(parse_id(id), properties));
        self
    }

    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::new(parse_id(source), parse_id(target)));
        self
    }

    pub fn topology(&self) -> Topology {
        Topology::new(self.resources.clone(), self.edges.clone())
    }

    pub fn build(&self) -> String {
        self.topology().to_snapshot_string().unwrap()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }
}

fn parse_id(id: &str) -> ResourceId {
    id.parse()
        .unwrap_or_else(|e| panic!("invalid resource id {id:?}: {e}"))
}

/// Two-resource snapshot used as a common starting point
pub fn seed_snapshot() -> SnapshotBuilder {
    SnapshotBuilder::new()
        .resource_with("aws:lambda:api", &[("memory", 512_i64.into())])
        .resource_with("aws:rds_instance:db", &[("instance_class", "db.t3.small".into())])
        .edge("aws:lambda:api", "aws:rds_instance:db")
}

/// Engine replaying queued outputs
///
/// With an empty queue it echoes the input snapshot. Every request is
/// recorded for later assertions.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    outputs: Mutex<VecDeque<Result<EngineOutput, String>>>,
    requests: Mutex<Vec<EngineRequest>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful run producing `snapshot`
    pub fn push_snapshot(&self, snapshot: impl Into<Vec<u8>>) {
        self.outputs.lock().push_back(Ok(EngineOutput::new(snapshot)));
    }

    /// Queue a full output
    pub fn push_output(&self, output: EngineOutput) {
        self.outputs.lock().push_back(Ok(output));
    }

    /// Queue a failing run
    pub fn push_failure(&self, message: impl Into<String>) {
        self.outputs.lock().push_back(Err(message.into()));
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn run(&self, request: EngineRequest) -> Result<EngineOutput, EngineError> {
        let scripted = self.outputs.lock().pop_front();
        let echo = request.input_snapshot.clone();
        self.requests.lock().push(request);
        match scripted {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(EngineError::Failed(message)),
            None => Ok(EngineOutput::new(echo)),
        }
    }
}

/// Switches that make the fixture's stores fail with an I/O error
#[derive(Debug, Default)]
pub struct Faults {
    snapshot_writes: AtomicBool,
    appends: AtomicBool,
}

impl Faults {
    /// Fail every `write_snapshot`
    pub fn fail_snapshot_writes(&self, on: bool) {
        self.snapshot_writes.store(on, Ordering::SeqCst);
    }

    /// Fail every `add` and `replace_future_versions`
    pub fn fail_appends(&self, on: bool) {
        self.appends.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        } else {
            Ok(())
        }
    }
}

/// Version and environment store that fails appends on demand
#[derive(Debug)]
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }
}

#[async_trait]
impl VersionStore for FaultyStore {
    async fn add(&self, version: EnvironmentVersion) -> Result<(), StoreError> {
        Faults::check(&self.faults.appends)?;
        self.inner.add(version).await
    }

    async fn get(&self, key: &VersionKey) -> Result<EnvironmentVersion, StoreError> {
        self.inner.get(key).await
    }

    async fn list(
        &self,
        environment: &EnvironmentKey,
    ) -> Result<Vec<EnvironmentVersion>, StoreError> {
        self.inner.list(environment).await
    }

    async fn get_latest(
        &self,
        environment: &EnvironmentKey,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.inner.get_latest(environment).await
    }

    async fn get_previous(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.inner.get_previous(environment, version).await
    }

    async fn get_next(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.inner.get_next(environment, version).await
    }

    async fn delete_future_versions(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<usize, StoreError> {
        self.inner.delete_future_versions(environment, version).await
    }

    async fn replace_future_versions(
        &self,
        version: EnvironmentVersion,
    ) -> Result<usize, StoreError> {
        Faults::check(&self.faults.appends)?;
        self.inner.replace_future_versions(version).await
    }

    async fn update(&self, version: EnvironmentVersion) -> Result<(), StoreError> {
        self.inner.update(version).await
    }

    async fn find_by_hash(
        &self,
        environment: &EnvironmentKey,
        hash: &VersionHash,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.inner.find_by_hash(environment, hash).await
    }
}

#[async_trait]
impl EnvironmentStore for FaultyStore {
    async fn create_environment(&self, environment: Environment) -> Result<(), StoreError> {
        self.inner.create_environment(environment).await
    }

    async fn delete_environment(&self, key: &EnvironmentKey) -> Result<(), StoreError> {
        self.inner.delete_environment(key).await
    }

    async fn get_environment(&self, key: &EnvironmentKey) -> Result<Environment, StoreError> {
        self.inner.get_environment(key).await
    }

    async fn list_environments(&self, architecture: &str) -> Result<Vec<Environment>, StoreError> {
        self.inner.list_environments(architecture).await
    }

    async fn set_current(
        &self,
        key: &EnvironmentKey,
        expected: Option<u64>,
        new: u64,
    ) -> Result<Environment, StoreError> {
        self.inner.set_current(key, expected, new).await
    }
}

/// Snapshot store that fails writes on demand
#[derive(Debug)]
pub struct FaultySnapshotStore {
    inner: Arc<InMemorySnapshotStore>,
    faults: Arc<Faults>,
}

impl FaultySnapshotStore {
    pub fn new(inner: Arc<InMemorySnapshotStore>, faults: Arc<Faults>) -> Self {
        Self { inner, faults }
    }
}

#[async_trait]
impl SnapshotStore for FaultySnapshotStore {
    async fn get_snapshot(&self, key: &VersionKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_snapshot(key).await
    }

    async fn write_snapshot(&self, key: &VersionKey, bytes: &[u8]) -> Result<String, StoreError> {
        Faults::check(&self.faults.snapshot_writes)?;
        self.inner.write_snapshot(key, bytes).await
    }
}

/// Manager over in-memory stores and a scripted engine
///
/// The manager reaches the stores through [`FaultyStore`] and
/// [`FaultySnapshotStore`]; flip [`Faults`] to inject I/O failures.
pub struct Fixture {
    pub manager: EnvironmentManager,
    pub store: Arc<InMemoryStore>,
    pub snapshots: Arc<InMemorySnapshotStore>,
    pub engine: Arc<ScriptedEngine>,
    pub faults: Arc<Faults>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::new())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let engine = Arc::new(ScriptedEngine::new());
        let faults = Arc::new(Faults::default());
        let manager = EnvironmentManager::new(
            Arc::new(FaultyStore::new(store.clone(), faults.clone())),
            Arc::new(FaultySnapshotStore::new(snapshots.clone(), faults.clone())),
            engine.clone(),
            config,
        );
        Self {
            manager,
            store,
            snapshots,
            engine,
            faults,
        }
    }

    /// Default environment seeded with `snapshot`
    pub async fn with_default(snapshot: &SnapshotBuilder) -> Self {
        let fixture = Self::new();
        fixture
            .manager
            .create_environment(
                ARCHITECTURE,
                DEFAULT_ENV,
                EnvironmentTags::default_environment(),
                "fixture",
                Some(snapshot.bytes().as_slice()),
            )
            .await
            .unwrap();
        fixture
    }

    /// Default environment plus a restricted `prod` cloned from it
    pub async fn with_prod(snapshot: &SnapshotBuilder) -> Self {
        let fixture = Self::with_default(snapshot).await;
        fixture
            .manager
            .clone_environment(
                ARCHITECTURE,
                DEFAULT_ENV,
                PROD_ENV,
                EnvironmentTags::restricted(),
                "fixture",
            )
            .await
            .unwrap();
        fixture
    }

    pub async fn current(&self, environment: &str) -> EnvironmentVersion {
        self.manager
            .get_current(ARCHITECTURE, environment)
            .await
            .unwrap()
    }

    /// Raw snapshot bytes stored for a version
    pub async fn snapshot_of(&self, environment: &str, version: u64) -> Option<Vec<u8>> {
        self.snapshots
            .get_snapshot(&EnvironmentKey::new(ARCHITECTURE, environment).version(version))
            .await
            .unwrap()
    }

    pub async fn version_numbers(&self, environment: &str) -> Vec<u64> {
        self.manager
            .list_versions(ARCHITECTURE, environment)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
