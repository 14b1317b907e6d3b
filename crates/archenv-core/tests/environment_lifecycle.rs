//! Functional tests for environment history management.
//!
//! Core guarantees exercised here:
//! - Version numbers are contiguous from 0 no matter which operation
//!   produced them.
//! - `current` only moves after a successful append and only from the
//!   version the caller expected.
//! - Runs on a rolled-back environment either refuse or, with overwrite,
//!   prune the newer versions so history stays linear.
//! - Snapshots land in the filesystem store when a snapshot root is set.

use archenv_core::{CoreError, EngineOutput, ErrorKind, ManagerConfig, RunRequest};
use archenv_store::{ConfigIssue, EnvironmentTags, SnapshotStore, StoreError};
use archenv_test_utils::{seed_snapshot, Fixture, SnapshotBuilder, ARCHITECTURE, DEFAULT_ENV};
use archenv_topology::{diff, DiffStatus, Topology};
use pretty_assertions::assert_eq;

async fn run_default(f: &Fixture, expected: u64, snapshot: &SnapshotBuilder) -> u64 {
    f.engine.push_snapshot(snapshot.build());
    f.manager
        .run(RunRequest::new(ARCHITECTURE, DEFAULT_ENV, expected, "alice"))
        .await
        .unwrap()
        .version
}

/// Scenario: `{A, B}, A->B` against `{B, C}, B->C`.
#[test]
fn structural_diff_of_two_snapshots() {
    let snapshot1 = SnapshotBuilder::new()
        .resource("aws:lambda:a")
        .resource("aws:lambda:b")
        .edge("aws:lambda:a", "aws:lambda:b")
        .topology();
    let snapshot2 = SnapshotBuilder::new()
        .resource("aws:lambda:b")
        .resource("aws:lambda:c")
        .edge("aws:lambda:b", "aws:lambda:c")
        .topology();

    let result = diff(&snapshot2, &snapshot1, false);

    let statuses: Vec<(String, DiffStatus)> = result
        .resources
        .iter()
        .map(|(id, entry)| (id.to_string(), entry.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("aws:lambda:a".to_string(), DiffStatus::Removed),
            ("aws:lambda:c".to_string(), DiffStatus::Added),
        ]
    );

    let edges: Vec<(String, DiffStatus)> = result
        .edges
        .iter()
        .map(|(edge, entry)| (edge.to_string(), entry.status))
        .collect();
    assert_eq!(
        edges,
        vec![
            ("aws:lambda:a -> aws:lambda:b".to_string(), DiffStatus::Removed),
            ("aws:lambda:b -> aws:lambda:c".to_string(), DiffStatus::Added),
        ]
    );
}

#[tokio::test]
async fn runs_append_contiguous_versions() {
    let f = Fixture::with_default(&seed_snapshot()).await;

    let mut expected = 0;
    for size in [1024_i64, 2048, 4096] {
        let next = SnapshotBuilder::new().resource_with("aws:lambda:api", &[("memory", size.into())]);
        expected = run_default(&f, expected, &next).await;
    }

    assert_eq!(f.version_numbers(DEFAULT_ENV).await, vec![0, 1, 2, 3]);
    assert_eq!(f.current(DEFAULT_ENV).await.version, 3);
}

#[tokio::test]
async fn engine_receives_current_snapshot_and_config_errors_are_kept() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    let issue = ConfigIssue {
        resource: Some("aws:lambda:api".parse().unwrap()),
        property: Some("memory".into()),
        message: "memory above account quota".into(),
    };
    f.engine.push_output(
        EngineOutput::new(seed_snapshot().build()).with_config_errors(vec![issue.clone()]),
    );

    let v1 = f
        .manager
        .run(RunRequest::new(ARCHITECTURE, DEFAULT_ENV, 0, "alice"))
        .await
        .unwrap();

    let requests = f.engine.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].input_snapshot, seed_snapshot().bytes());
    assert_eq!(v1.resource_configuration.config_errors, vec![issue]);
}

#[tokio::test]
async fn rollback_then_run_requires_overwrite() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    run_default(&f, 0, &seed_snapshot().resource("aws:s3_bucket:a")).await;
    run_default(&f, 1, &seed_snapshot().resource("aws:s3_bucket:b")).await;

    let env = f.manager.set_current(ARCHITECTURE, DEFAULT_ENV, 1).await.unwrap();
    assert_eq!(env.current, Some(1));
    let calls = f.engine.call_count();

    f.engine
        .push_snapshot(seed_snapshot().resource("aws:s3_bucket:c").build());
    let err = f
        .manager
        .run(RunRequest::new(ARCHITECTURE, DEFAULT_ENV, 1, "alice"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::VersionConflict {
            current: 1,
            latest: 2,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(f.engine.call_count(), calls);

    let v2 = f
        .manager
        .run(RunRequest::new(ARCHITECTURE, DEFAULT_ENV, 1, "alice").with_overwrite(true))
        .await
        .unwrap();
    assert_eq!(v2.version, 2);
    assert_eq!(f.version_numbers(DEFAULT_ENV).await, vec![0, 1, 2]);

    let topology = f
        .manager
        .current_topology(ARCHITECTURE, DEFAULT_ENV)
        .await
        .unwrap();
    let ids: Vec<String> = topology.resources().iter().map(|r| r.id.to_string()).collect();
    assert!(ids.contains(&"aws:s3_bucket:c".to_string()));
    assert!(!ids.contains(&"aws:s3_bucket:b".to_string()));
}

#[tokio::test]
async fn stale_expected_version_is_precondition_failure() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    run_default(&f, 0, &seed_snapshot()).await;

    let err = f
        .manager
        .run(RunRequest::new(ARCHITECTURE, DEFAULT_ENV, 0, "bob"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::StaleVersion {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
}

#[tokio::test]
async fn unparsable_engine_output_persists_nothing() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    f.engine.push_snapshot("resources:\n  not-an-id: {}\n");

    let err = f
        .manager
        .run(RunRequest::new(ARCHITECTURE, DEFAULT_ENV, 0, "alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Topology(_)));
    assert_eq!(f.version_numbers(DEFAULT_ENV).await, vec![0]);
    assert_eq!(f.snapshots.len(), 1);
}

#[tokio::test]
async fn set_current_to_missing_version_is_not_found() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    let err = f
        .manager
        .set_current(ARCHITECTURE, DEFAULT_ENV, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::VersionNotFound(_))));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn duplicate_environment_is_conflict() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    let err = f
        .manager
        .create_environment(
            ARCHITECTURE,
            DEFAULT_ENV,
            EnvironmentTags::default_environment(),
            "alice",
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn clone_copies_snapshot_and_tracks_source() {
    let f = Fixture::with_default(&seed_snapshot()).await;
    let source = f.current(DEFAULT_ENV).await;

    let v0 = f
        .manager
        .clone_environment(
            ARCHITECTURE,
            DEFAULT_ENV,
            "staging",
            EnvironmentTags::restricted().with_label("team", "payments"),
            "ops",
        )
        .await
        .unwrap();

    assert_eq!(v0.version, 0);
    assert_eq!(v0.version_hash, source.version_hash);
    let tracks = v0.tracks().unwrap();
    assert_eq!(tracks.environment, DEFAULT_ENV);
    assert_eq!(tracks.version_hash, source.version_hash);

    let environments = f.manager.list_environments(ARCHITECTURE).await.unwrap();
    let ids: Vec<&str> = environments.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![DEFAULT_ENV, "staging"]);
    assert!(!environments[1].allows_topological_changes());
}

#[tokio::test]
async fn filesystem_snapshot_store_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = ManagerConfig::new().with_snapshot_root(dir.path());
    let snapshots = config.snapshot_store();
    let f = Fixture::with_config(config);

    let manager = archenv_core::EnvironmentManager::new(
        f.store.clone(),
        snapshots.clone(),
        f.engine.clone(),
        f.manager.config().clone(),
    );
    let v0 = manager
        .create_environment(
            ARCHITECTURE,
            DEFAULT_ENV,
            EnvironmentTags::default_environment(),
            "alice",
            Some(seed_snapshot().bytes().as_slice()),
        )
        .await
        .unwrap();

    assert!(v0.state_location.starts_with("file://"));
    assert!(dir.path().join("shop/default/0/state.yaml").exists());

    let stored = snapshots.get_snapshot(&v0.key()).await.unwrap().unwrap();
    let parsed = Topology::from_slice(&stored).unwrap();
    assert_eq!(parsed, seed_snapshot().topology());
}
