//! # archenv Store
//!
//! Version history, environment records and snapshot blobs.
//!
//! ## Core Concepts
//!
//! - **EnvironmentVersion**: immutable record of one snapshot of one environment
//! - **Environment**: linear history plus a movable `current` pointer
//! - **VersionStore / EnvironmentStore**: async storage ports
//! - **SnapshotStore**: opaque blob port keyed by version
//!
//! Stores protect their own maps but do not serialize logical operations.
//! One writer per environment at a time is the caller's job.
//!
//! ## Example
//!
//! ```rust
//! use archenv_store::{
//!     ArchitectureStore, Environment, EnvironmentStore, EnvironmentTags, EnvironmentVersion,
//!     InMemoryStore, VersionStore,
//! };
//! use archenv_topology::VersionHash;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), archenv_store::StoreError> {
//! let store = InMemoryStore::new();
//! let env = Environment::new("shop", "dev", EnvironmentTags::default_environment());
//! let key = env.key();
//! store.create_environment(env).await?;
//!
//! let v0 = EnvironmentVersion::new(key.version(0), VersionHash::of_snapshot(b""), "me", "memory://shop/dev/0");
//! store.add(v0).await?;
//! store.set_current(&key, None, 0).await?;
//!
//! assert_eq!(store.get_current(&key).await?.version, 0);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod constraint;
mod error;
mod memory;
mod snapshot;
mod store;
mod version;

pub use constraint::{Constraint, ConstraintScope};
pub use error::StoreError;
pub use memory::InMemoryStore;
pub use snapshot::{FsSnapshotStore, InMemorySnapshotStore, SnapshotStore, SNAPSHOT_FILE};
pub use store::{ArchitectureStore, EnvironmentStore, VersionStore};
pub use version::{
    ConfigIssue, Environment, EnvironmentKey, EnvironmentTags, EnvironmentVersion,
    ResourceConfiguration, Tracks, VersionKey,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
