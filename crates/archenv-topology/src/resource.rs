//! Resource and edge identities
//!
//! Provides [`ResourceId`] and [`Edge`], whose equality, ordering and hashing
//! are defined by their canonical string form so that topologies can be
//! compared with plain set algebra.

use crate::error::TopologyError;
use crate::value::PropertyMap;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Identity of a resource in a topology
///
/// Canonical form is `provider:type:name` or `provider:type:namespace:name`.
///
/// # Examples
/// - `aws:rds_instance:orders-db`
/// - `aws:subnet:vpc-main:private-a`
#[derive(Debug, Clone)]
pub struct ResourceId {
    provider: String,
    kind: String,
    namespace: Option<String>,
    name: String,
    canonical: String,
}

impl ResourceId {
    /// Create an id without namespace
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::build(provider.into(), kind.into(), None, name.into())
    }

    /// Create a namespaced id
    #[must_use]
    pub fn namespaced(
        provider: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::build(
            provider.into(),
            kind.into(),
            Some(namespace.into()),
            name.into(),
        )
    }

    fn build(provider: String, kind: String, namespace: Option<String>, name: String) -> Self {
        let canonical = match &namespace {
            Some(ns) => format!("{provider}:{kind}:{ns}:{name}"),
            None => format!("{provider}:{kind}:{name}"),
        };
        Self {
            provider,
            kind,
            namespace,
            name,
            canonical,
        }
    }

    /// Provider segment (e.g. `aws`)
    #[inline]
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Resource type segment (e.g. `rds_instance`)
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Optional namespace segment
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Name segment, always the last token
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical string form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl FromStr for ResourceId {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(TopologyError::InvalidResourceId(s.to_string()));
        }
        match parts.as_slice() {
            [provider, kind, name] => Ok(Self::new(*provider, *kind, *name)),
            [provider, kind, namespace, name] => {
                Ok(Self::namespaced(*provider, *kind, *namespace, *name))
            }
            _ => Err(TopologyError::InvalidResourceId(s.to_string())),
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl serde::Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Directed dependency between two resources
///
/// Identity is the `(source, target)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    /// Resource the edge starts from
    pub source: ResourceId,
    /// Resource the edge points to
    pub target: ResourceId,
}

impl Edge {
    /// Separator used in snapshot edge keys
    pub const SEPARATOR: &'static str = "->";

    /// Create a new edge
    #[inline]
    #[must_use]
    pub fn new(source: ResourceId, target: ResourceId) -> Self {
        Self { source, target }
    }
}

impl FromStr for Edge {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, target) = s
            .split_once(Self::SEPARATOR)
            .ok_or_else(|| TopologyError::InvalidEdge(s.to_string()))?;
        Ok(Self {
            source: source.trim().parse()?,
            target: target.trim().parse()?,
        })
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.source, Self::SEPARATOR, self.target)
    }
}

impl serde::Serialize for Edge {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Edge {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A resource together with its configured properties
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Resource identity
    pub id: ResourceId,
    /// Property tree, empty when the snapshot lists no properties
    pub properties: PropertyMap,
}

impl Resource {
    /// Create a resource
    #[inline]
    #[must_use]
    pub fn new(id: ResourceId, properties: PropertyMap) -> Self {
        Self { id, properties }
    }
}
