//! In-memory store
//!
//! Backs both [`VersionStore`] and [`EnvironmentStore`]. Used in tests and by
//! embedders that persist elsewhere.

use crate::error::StoreError;
use crate::store::{EnvironmentStore, VersionStore};
use crate::version::{Environment, EnvironmentKey, EnvironmentVersion, VersionKey};
use archenv_topology::VersionHash;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

type History = BTreeMap<u64, EnvironmentVersion>;

/// Map-backed environment and version store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    environments: DashMap<EnvironmentKey, Environment>,
    versions: RwLock<HashMap<EnvironmentKey, History>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_environment(&self, key: &EnvironmentKey) -> Result<(), StoreError> {
        if self.environments.contains_key(key) {
            Ok(())
        } else {
            Err(StoreError::EnvironmentNotFound(key.clone()))
        }
    }

    fn read_history<R>(
        &self,
        key: &EnvironmentKey,
        f: impl FnOnce(&History) -> R,
    ) -> Result<R, StoreError> {
        self.ensure_environment(key)?;
        let versions = self.versions.read();
        let empty = History::new();
        Ok(f(versions.get(key).unwrap_or(&empty)))
    }
}

#[async_trait]
impl VersionStore for InMemoryStore {
    async fn add(&self, version: EnvironmentVersion) -> Result<(), StoreError> {
        let env_key = version.environment_key();
        self.ensure_environment(&env_key)?;

        let mut versions = self.versions.write();
        let history = versions.entry(env_key).or_default();
        if history.contains_key(&version.version) {
            return Err(StoreError::VersionExists(version.key()));
        }
        let expected = history.keys().next_back().map_or(0, |latest| latest + 1);
        if version.version != expected {
            return Err(StoreError::NonContiguous {
                key: version.key(),
                expected,
            });
        }
        history.insert(version.version, version);
        Ok(())
    }

    async fn get(&self, key: &VersionKey) -> Result<EnvironmentVersion, StoreError> {
        self.versions
            .read()
            .get(&key.environment_key())
            .and_then(|history| history.get(&key.version))
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound(key.clone()))
    }

    async fn list(
        &self,
        environment: &EnvironmentKey,
    ) -> Result<Vec<EnvironmentVersion>, StoreError> {
        self.read_history(environment, |h| h.values().cloned().collect())
    }

    async fn get_latest(
        &self,
        environment: &EnvironmentKey,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.read_history(environment, |h| h.values().next_back().cloned())
    }

    async fn get_previous(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.read_history(environment, |h| {
            h.range(..version).next_back().map(|(_, v)| v.clone())
        })
    }

    async fn get_next(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.read_history(environment, |h| {
            h.range((Bound::Excluded(version), Bound::Unbounded))
                .next()
                .map(|(_, v)| v.clone())
        })
    }

    async fn delete_future_versions(
        &self,
        environment: &EnvironmentKey,
        version: u64,
    ) -> Result<usize, StoreError> {
        self.ensure_environment(environment)?;

        let deleted = {
            let mut versions = self.versions.write();
            match versions.get_mut(environment) {
                Some(history) => {
                    let pruned = history.split_off(&version.saturating_add(1));
                    pruned.len()
                }
                None => 0,
            }
        };

        if let Some(mut env) = self.environments.get_mut(environment) {
            if env.current.is_some_and(|current| current > version) {
                env.current = Some(version);
            }
        }

        if deleted > 0 {
            tracing::debug!(environment = %environment, above = version, deleted, "pruned future versions");
        }
        Ok(deleted)
    }

    async fn replace_future_versions(
        &self,
        version: EnvironmentVersion,
    ) -> Result<usize, StoreError> {
        let env_key = version.environment_key();
        let number = version.version;
        self.ensure_environment(&env_key)?;

        let deleted = {
            let mut versions = self.versions.write();
            let history = versions.entry(env_key.clone()).or_default();
            let expected = history
                .range(..number)
                .next_back()
                .map_or(0, |(below, _)| below + 1);
            if number != expected {
                return Err(StoreError::NonContiguous {
                    key: version.key(),
                    expected,
                });
            }
            let pruned = history.split_off(&number);
            history.insert(number, version);
            pruned.len()
        };

        if let Some(mut env) = self.environments.get_mut(&env_key) {
            if env.current.is_some_and(|current| current >= number) {
                env.current = number.checked_sub(1);
            }
        }

        tracing::debug!(environment = %env_key, version = number, deleted, "replaced future versions");
        Ok(deleted)
    }

    async fn update(&self, version: EnvironmentVersion) -> Result<(), StoreError> {
        let key = version.key();
        let mut versions = self.versions.write();
        let stored = versions
            .get_mut(&key.environment_key())
            .and_then(|history| history.get_mut(&key.version))
            .ok_or_else(|| StoreError::VersionNotFound(key.clone()))?;
        if !stored.same_apart_from_iac(&version) {
            return Err(StoreError::Immutable(key));
        }
        *stored = version;
        Ok(())
    }

    async fn find_by_hash(
        &self,
        environment: &EnvironmentKey,
        hash: &VersionHash,
    ) -> Result<Option<EnvironmentVersion>, StoreError> {
        self.read_history(environment, |h| {
            h.values()
                .rev()
                .find(|v| &v.version_hash == hash)
                .cloned()
        })
    }
}

#[async_trait]
impl EnvironmentStore for InMemoryStore {
    async fn create_environment(&self, mut environment: Environment) -> Result<(), StoreError> {
        environment.current = None;
        match self.environments.entry(environment.key()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                Err(StoreError::EnvironmentExists(entry.key().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(environment);
                Ok(())
            }
        }
    }

    async fn delete_environment(&self, key: &EnvironmentKey) -> Result<(), StoreError> {
        self.environments
            .remove(key)
            .ok_or_else(|| StoreError::EnvironmentNotFound(key.clone()))?;
        self.versions.write().remove(key);
        Ok(())
    }

    async fn get_environment(&self, key: &EnvironmentKey) -> Result<Environment, StoreError> {
        self.environments
            .get(key)
            .map(|env| env.clone())
            .ok_or_else(|| StoreError::EnvironmentNotFound(key.clone()))
    }

    async fn list_environments(&self, architecture: &str) -> Result<Vec<Environment>, StoreError> {
        let mut environments: Vec<Environment> = self
            .environments
            .iter()
            .filter(|entry| entry.key().architecture == architecture)
            .map(|entry| entry.value().clone())
            .collect();
        environments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(environments)
    }

    async fn set_current(
        &self,
        key: &EnvironmentKey,
        expected: Option<u64>,
        new: u64,
    ) -> Result<Environment, StoreError> {
        let exists = self
            .versions
            .read()
            .get(key)
            .is_some_and(|history| history.contains_key(&new));

        let mut env = self
            .environments
            .get_mut(key)
            .ok_or_else(|| StoreError::EnvironmentNotFound(key.clone()))?;
        if !exists {
            return Err(StoreError::VersionNotFound(key.version(new)));
        }
        if env.current != expected {
            return Err(StoreError::StaleVersion {
                environment: key.clone(),
                expected,
                actual: env.current,
            });
        }
        env.current = Some(new);
        Ok(env.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArchitectureStore;
    use crate::version::EnvironmentTags;

    fn key() -> EnvironmentKey {
        EnvironmentKey::new("shop", "dev")
    }

    fn version(n: u64) -> EnvironmentVersion {
        EnvironmentVersion::new(
            key().version(n),
            VersionHash::of_snapshot(format!("state-{n}").as_bytes()),
            "tester",
            format!("memory://shop/dev/{n}"),
        )
    }

    async fn seeded(count: u64) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .create_environment(Environment::new("shop", "dev", EnvironmentTags::default_environment()))
            .await
            .unwrap();
        for n in 0..count {
            store.add(version(n)).await.unwrap();
        }
        if count > 0 {
            store.set_current(&key(), None, count - 1).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn versions_are_contiguous_from_zero() {
        let store = seeded(4).await;
        let numbers: Vec<u64> = store
            .list(&key())
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(numbers, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected() {
        let store = seeded(2).await;
        let err = store.add(version(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionExists(_)));
    }

    #[tokio::test]
    async fn gap_is_rejected() {
        let store = seeded(2).await;
        let err = store.add(version(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::NonContiguous { expected: 2, .. }));
    }

    #[tokio::test]
    async fn add_requires_environment() {
        let store = InMemoryStore::new();
        let err = store.add(version(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::EnvironmentNotFound(_)));
    }

    #[tokio::test]
    async fn neighbour_lookups() {
        let store = seeded(4).await;
        let latest = store.get_latest(&key()).await.unwrap().unwrap();
        assert_eq!(latest.version, 3);

        let prev = store.get_previous(&key(), 2).await.unwrap().unwrap();
        assert_eq!(prev.version, 1);
        assert!(store.get_previous(&key(), 0).await.unwrap().is_none());

        let next = store.get_next(&key(), 2).await.unwrap().unwrap();
        assert_eq!(next.version, 3);
        assert!(store.get_next(&key(), 3).await.unwrap().is_none());
        assert!(store.get_next(&key(), u64::MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_future_versions_prunes_and_pulls_back_current() {
        let store = seeded(5).await;
        let deleted = store.delete_future_versions(&key(), 1).await.unwrap();
        assert_eq!(deleted, 3);

        assert_eq!(store.get_latest(&key()).await.unwrap().unwrap().version, 1);
        assert_eq!(store.get_environment(&key()).await.unwrap().current, Some(1));
        assert_eq!(store.get_current(&key()).await.unwrap().version, 1);

        store.add(version(2)).await.unwrap();
    }

    #[tokio::test]
    async fn replace_future_versions_swaps_the_tail_in_one_step() {
        let store = seeded(4).await;
        store.set_current(&key(), Some(3), 1).await.unwrap();

        let mut replacement = version(2);
        replacement.created_by = "overwriter".into();
        let deleted = store.replace_future_versions(replacement).await.unwrap();
        assert_eq!(deleted, 2);

        let history = store.list(&key()).await.unwrap();
        assert_eq!(history.iter().map(|v| v.version).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(history[2].created_by, "overwriter");
        assert_eq!(store.get_environment(&key()).await.unwrap().current, Some(1));
    }

    #[tokio::test]
    async fn rejected_replacement_changes_nothing() {
        let store = seeded(4).await;
        let err = store.replace_future_versions(version(7)).await.unwrap_err();
        assert!(matches!(err, StoreError::NonContiguous { expected: 4, .. }));

        assert_eq!(store.list(&key()).await.unwrap().len(), 4);
        assert_eq!(store.get_environment(&key()).await.unwrap().current, Some(3));
    }

    #[tokio::test]
    async fn replacing_from_the_current_version_pulls_current_back() {
        let store = seeded(3).await;
        store.replace_future_versions(version(2)).await.unwrap();
        assert_eq!(store.get_environment(&key()).await.unwrap().current, Some(1));

        store.replace_future_versions(version(0)).await.unwrap();
        assert_eq!(store.get_environment(&key()).await.unwrap().current, None);
        assert_eq!(store.list(&key()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleted_environment_can_be_recreated() {
        let store = seeded(2).await;
        store.delete_environment(&key()).await.unwrap();
        assert!(store.get_environment(&key()).await.unwrap_err().is_not_found());
        assert!(matches!(
            store.delete_environment(&key()).await,
            Err(StoreError::EnvironmentNotFound(_))
        ));

        store
            .create_environment(Environment::new("shop", "dev", EnvironmentTags::default_environment()))
            .await
            .unwrap();
        assert!(store.list(&key()).await.unwrap().is_empty());
        store.add(version(0)).await.unwrap();
    }

    #[tokio::test]
    async fn update_only_attaches_iac_location() {
        let store = seeded(1).await;
        let mut v = store.get(&key().version(0)).await.unwrap();
        v.iac_location = Some("file:///iac/0.zip".into());
        store.update(v.clone()).await.unwrap();
        assert_eq!(
            store.get(&key().version(0)).await.unwrap().iac_location,
            v.iac_location
        );

        v.created_by = "mallory".into();
        assert!(matches!(
            store.update(v).await.unwrap_err(),
            StoreError::Immutable(_)
        ));
    }

    #[tokio::test]
    async fn set_current_is_compare_and_set() {
        let store = seeded(3).await;
        let err = store.set_current(&key(), Some(0), 1).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleVersion {
                expected: Some(0),
                actual: Some(2),
                ..
            }
        ));

        let env = store.set_current(&key(), Some(2), 0).await.unwrap();
        assert_eq!(env.current, Some(0));

        let err = store.set_current(&key(), Some(0), 9).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn get_current_without_versions() {
        let store = seeded(0).await;
        assert!(matches!(
            store.get_current(&key()).await.unwrap_err(),
            StoreError::NoCurrentVersion(_)
        ));
        assert!(matches!(
            store
                .get_current(&EnvironmentKey::new("shop", "missing"))
                .await
                .unwrap_err(),
            StoreError::EnvironmentNotFound(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_environment_is_rejected() {
        let store = seeded(0).await;
        let err = store
            .create_environment(Environment::new("shop", "dev", EnvironmentTags::restricted()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EnvironmentExists(_)));
    }

    #[tokio::test]
    async fn find_by_hash_returns_matching_version() {
        let store = seeded(3).await;
        let hash = VersionHash::of_snapshot(b"state-1");
        let found = store.find_by_hash(&key(), &hash).await.unwrap().unwrap();
        assert_eq!(found.version, 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn block_on<F: std::future::Future>(f: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(f)
        }

        proptest! {
            #[test]
            fn listed_versions_are_dense(count in 0u64..24) {
                let numbers: Vec<u64> = block_on(async {
                    let store = seeded(count).await;
                    store.list(&key()).await.unwrap().iter().map(|v| v.version).collect()
                });
                prop_assert_eq!(numbers, (0..count).collect::<Vec<_>>());
            }

            #[test]
            fn pruning_bounds_latest(count in 1u64..24, keep in 0u64..30) {
                let (latest, current) = block_on(async {
                    let store = seeded(count).await;
                    store.delete_future_versions(&key(), keep).await.unwrap();
                    let latest = store.get_latest(&key()).await.unwrap().map(|v| v.version);
                    let current = store.get_environment(&key()).await.unwrap().current;
                    (latest, current)
                });
                prop_assert!(latest.is_some_and(|l| l <= keep));
                prop_assert!(current.is_some_and(|c| c <= keep));
                prop_assert_eq!(latest, current);
            }
        }
    }
}
