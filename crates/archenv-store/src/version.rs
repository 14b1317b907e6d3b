//! Environment and version records
//!
//! [`EnvironmentVersion`] is an immutable snapshot record; [`Environment`]
//! carries the movable `current` pointer and the topological-change policy.

use crate::constraint::Constraint;
use archenv_topology::{PropertyMap, ResourceId, TopologyDiff, VersionHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Identifies one environment of one architecture
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvironmentKey {
    /// Owning architecture
    pub architecture: String,
    /// Environment id within the architecture
    pub environment: String,
}

impl EnvironmentKey {
    /// Create a key
    #[inline]
    #[must_use]
    pub fn new(architecture: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            architecture: architecture.into(),
            environment: environment.into(),
        }
    }

    /// Key of one version of this environment
    #[inline]
    #[must_use]
    pub fn version(&self, version: u64) -> VersionKey {
        VersionKey {
            architecture: self.architecture.clone(),
            environment: self.environment.clone(),
            version,
        }
    }
}

impl Display for EnvironmentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.architecture, self.environment)
    }
}

/// Identifies one version of one environment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    /// Owning architecture
    pub architecture: String,
    /// Environment id
    pub environment: String,
    /// Version number
    pub version: u64,
}

impl VersionKey {
    /// Key of the owning environment
    #[inline]
    #[must_use]
    pub fn environment_key(&self) -> EnvironmentKey {
        EnvironmentKey::new(self.architecture.clone(), self.environment.clone())
    }
}

impl Display for VersionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.architecture, self.environment, self.version)
    }
}

/// Source a version was promoted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracks {
    /// Tracked environment id
    pub environment: String,
    /// Hash of the tracked environment's version at promotion time
    pub version_hash: VersionHash,
}

impl Tracks {
    /// Create a tracking record
    #[inline]
    #[must_use]
    pub fn new(environment: impl Into<String>, version_hash: VersionHash) -> Self {
        Self {
            environment: environment.into(),
            version_hash,
        }
    }
}

/// Configuration problem reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    /// Resource the problem refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceId>,
    /// Property path within the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Human-readable message
    pub message: String,
}

/// Per-version configuration relative to the tracked environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfiguration {
    /// Promotion source, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks: Option<Tracks>,

    /// Property overrides kept on top of the tracked state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<BTreeMap<ResourceId, PropertyMap>>,

    /// Difference from the tracked snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<TopologyDiff>,

    /// Problems reported by the engine run that produced this version
    #[serde(default)]
    pub config_errors: Vec<ConfigIssue>,
}

/// Immutable snapshot record
///
/// # Invariants
/// - `version` is unique per environment and numbers are contiguous from 0
/// - `version_hash` never changes after creation
/// - only `iac_location` may be attached after the fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentVersion {
    pub architecture_id: String,
    pub environment_id: String,
    pub version: u64,
    pub version_hash: VersionHash,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub state_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iac_location: Option<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub resource_configuration: ResourceConfiguration,
}

impl EnvironmentVersion {
    /// Create a version record stamped with the current time
    #[must_use]
    pub fn new(
        key: VersionKey,
        version_hash: VersionHash,
        created_by: impl Into<String>,
        state_location: impl Into<String>,
    ) -> Self {
        Self {
            architecture_id: key.architecture,
            environment_id: key.environment,
            version: key.version,
            version_hash,
            created_at: Utc::now(),
            created_by: created_by.into(),
            state_location: state_location.into(),
            iac_location: None,
            constraints: Vec::new(),
            resource_configuration: ResourceConfiguration::default(),
        }
    }

    /// Attach the constraints that produced this version
    #[inline]
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Attach resource configuration
    #[inline]
    #[must_use]
    pub fn with_resource_configuration(mut self, configuration: ResourceConfiguration) -> Self {
        self.resource_configuration = configuration;
        self
    }

    /// Store key
    #[must_use]
    pub fn key(&self) -> VersionKey {
        VersionKey {
            architecture: self.architecture_id.clone(),
            environment: self.environment_id.clone(),
            version: self.version,
        }
    }

    /// Owning environment key
    #[must_use]
    pub fn environment_key(&self) -> EnvironmentKey {
        EnvironmentKey::new(self.architecture_id.clone(), self.environment_id.clone())
    }

    /// Promotion source, if tracked
    #[inline]
    #[must_use]
    pub fn tracks(&self) -> Option<&Tracks> {
        self.resource_configuration.tracks.as_ref()
    }

    /// Same record except possibly `iac_location`
    #[must_use]
    pub fn same_apart_from_iac(&self, other: &Self) -> bool {
        let mut normalized = other.clone();
        normalized.iac_location.clone_from(&self.iac_location);
        *self == normalized
    }
}

/// Environment tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentTags {
    /// The default environment accepts topological changes
    #[serde(default)]
    pub default: bool,

    /// Free-form labels
    #[serde(default, flatten)]
    pub labels: BTreeMap<String, String>,
}

impl EnvironmentTags {
    /// Tags of the default environment
    #[inline]
    #[must_use]
    pub fn default_environment() -> Self {
        Self {
            default: true,
            labels: BTreeMap::new(),
        }
    }

    /// Tags of a restricted (property-only) environment
    #[inline]
    #[must_use]
    pub fn restricted() -> Self {
        Self::default()
    }

    /// Add a label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Named deployment lane with a linear version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub architecture_id: String,
    pub id: String,
    /// Version currently in effect; `None` until the first version exists
    pub current: Option<u64>,
    #[serde(default)]
    pub tags: EnvironmentTags,
}

impl Environment {
    /// Create an environment with no versions yet
    #[must_use]
    pub fn new(
        architecture_id: impl Into<String>,
        id: impl Into<String>,
        tags: EnvironmentTags,
    ) -> Self {
        Self {
            architecture_id: architecture_id.into(),
            id: id.into(),
            current: None,
            tags,
        }
    }

    /// Store key
    #[must_use]
    pub fn key(&self) -> EnvironmentKey {
        EnvironmentKey::new(self.architecture_id.clone(), self.id.clone())
    }

    /// Whether engine runs may add or remove resources and edges
    #[inline]
    #[must_use]
    pub fn allows_topological_changes(&self) -> bool {
        self.tags.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version() -> EnvironmentVersion {
        EnvironmentVersion::new(
            EnvironmentKey::new("arch", "prod").version(3),
            VersionHash::of_snapshot(b"state"),
            "alice",
            "memory://arch/prod/3",
        )
    }

    #[test]
    fn keys_render_compactly() {
        let v = version();
        assert_eq!(v.key().to_string(), "arch/prod@3");
        assert_eq!(v.environment_key().to_string(), "arch/prod");
        assert_eq!(v.key().environment_key(), v.environment_key());
    }

    #[test]
    fn iac_location_is_the_only_mutable_field() {
        let v = version();
        let mut with_iac = v.clone();
        with_iac.iac_location = Some("s3://iac/arch/prod/3.zip".into());
        assert!(v.same_apart_from_iac(&with_iac));

        let mut rehashed = v.clone();
        rehashed.version_hash = VersionHash::of_snapshot(b"other");
        assert!(!v.same_apart_from_iac(&rehashed));
    }

    #[test]
    fn nan_in_tracked_diff_still_allows_iac_update() {
        let tracked: archenv_topology::Topology =
            "resources:\n  aws:lambda:api:\n    ratio: 1.0\n".parse().unwrap();
        let generated: archenv_topology::Topology =
            "resources:\n  aws:lambda:api:\n    ratio: .nan\n".parse().unwrap();
        let v = version().with_resource_configuration(ResourceConfiguration {
            diff: Some(archenv_topology::diff(&generated, &tracked, true)),
            ..ResourceConfiguration::default()
        });

        let mut with_iac = v.clone();
        with_iac.iac_location = Some("s3://iac/arch/prod/3.zip".into());
        assert!(v.same_apart_from_iac(&with_iac));
    }

    #[test]
    fn tags_flatten_labels() {
        let tags = EnvironmentTags::default_environment().with_label("team", "payments");
        let json = serde_json::to_value(&tags).unwrap();
        assert_eq!(json, serde_json::json!({"default": true, "team": "payments"}));

        let decoded: EnvironmentTags = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, tags);
    }

    #[test]
    fn only_default_environment_allows_topology_changes() {
        assert!(Environment::new("a", "dev", EnvironmentTags::default_environment())
            .allows_topological_changes());
        assert!(!Environment::new("a", "prod", EnvironmentTags::restricted())
            .allows_topological_changes());
    }

    #[test]
    fn version_round_trips_through_json() {
        let mut v = version();
        v.resource_configuration.tracks =
            Some(Tracks::new("default", VersionHash::of_snapshot(b"base")));
        let json = serde_json::to_string(&v).unwrap();
        let decoded: EnvironmentVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, v);
    }
}
