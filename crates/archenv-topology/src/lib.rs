//! Topology model and differ
//!
//! Typed, hashable view of an environment snapshot and the set-based diff
//! used for drift reports and topological-change gating.
//!
//! # Core Concepts
//!
//! - [`ResourceId`]: `provider:type[:namespace]:name`, identity by canonical string
//! - [`Edge`]: directed `(source, target)` dependency
//! - [`Topology`]: resources and edges parsed from one snapshot
//! - [`PropertyValue`]: tagged property tree (`Scalar`, `Mapping`, `Sequence`)
//! - [`TopologyDiff`]: ADDED / REMOVED / CHANGED entries from [`diff`]
//! - [`VersionHash`]: 32-byte Blake3 digest of a stored snapshot
//!
//! # Example
//!
//! ```rust
//! use archenv_topology::{diff, DiffStatus, Topology};
//!
//! let before: Topology = "resources:\n  aws:s3_bucket:logs: {}\n".parse().unwrap();
//! let after: Topology = "resources:\n  aws:s3_bucket:assets: {}\n".parse().unwrap();
//!
//! let changes = diff(&after, &before, false);
//! assert!(changes.has_topological_changes());
//! assert_eq!(changes.resources_with(DiffStatus::Added).count(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod diff;
mod error;
mod hash;
mod resource;
mod topology;
mod value;

pub use diff::{
    diff, diff_properties, DiffEntry, DiffStatus, PropertyChange, PropertyChanges, TopologyDiff,
};
pub use error::TopologyError;
pub use hash::{HashError, VersionHash};
pub use resource::{Edge, Resource, ResourceId};
pub use topology::Topology;
pub use value::{PropertyMap, PropertyValue, Scalar};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
