//! Topology model and snapshot parser
//!
//! A snapshot is a YAML (or JSON) document with two optional top-level
//! sections:
//!
//! ```yaml
//! resources:
//!   aws:lambda:api:
//!     memory: 512
//!   aws:dynamodb_table:orders:
//! edges:
//!   aws:lambda:api -> aws:dynamodb_table:orders:
//! ```
//!
//! Values under `edges` are ignored. A missing or null section is empty.

use crate::error::TopologyError;
use crate::resource::{Edge, Resource, ResourceId};
use crate::value::{key_to_string, PropertyMap, PropertyValue, Scalar};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::str::FromStr;

const RESOURCES: &str = "resources";
const EDGES: &str = "edges";

/// Resource/edge graph of one snapshot
///
/// # Invariants
/// - Resource ids are unique
/// - Edges are unique by `(source, target)`
/// - Immutable once built
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    resources: Vec<Resource>,
    edges: Vec<Edge>,
}

impl Topology {
    /// Build from parts, dropping duplicate ids and edges (first wins)
    #[must_use]
    pub fn new(resources: Vec<Resource>, edges: Vec<Edge>) -> Self {
        let mut seen = HashSet::new();
        let resources = resources
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        let mut seen = HashSet::new();
        let edges = edges.into_iter().filter(|e| seen.insert(e.clone())).collect();
        Self { resources, edges }
    }

    /// Parse snapshot bytes
    ///
    /// # Errors
    /// Returns error if the bytes are not a well-formed snapshot
    pub fn from_slice(snapshot: &[u8]) -> Result<Self, TopologyError> {
        if snapshot.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let root: Value = serde_yaml::from_slice(snapshot)?;
        Self::from_value(root)
    }

    fn from_value(root: Value) -> Result<Self, TopologyError> {
        let mut root = match root {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(map) => map,
            _ => return Err(TopologyError::InvalidSection("snapshot")),
        };

        let resources = match section(&mut root, RESOURCES)? {
            Some(map) => map
                .into_iter()
                .map(|(key, props)| parse_resource(key_to_string(key), props))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let edges = match section(&mut root, EDGES)? {
            Some(map) => map
                .into_iter()
                .map(|(key, _)| key_to_string(key).parse::<Edge>())
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self::new(resources, edges))
    }

    /// All resources, in snapshot order
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// All edges, in snapshot order
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Look up a resource by id
    #[must_use]
    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// Set of resource ids
    #[must_use]
    pub fn resource_ids(&self) -> HashSet<&ResourceId> {
        self.resources.iter().map(|r| &r.id).collect()
    }

    /// Set of edges
    #[must_use]
    pub fn edge_set(&self) -> HashSet<&Edge> {
        self.edges.iter().collect()
    }

    /// True when there are no resources and no edges
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.edges.is_empty()
    }

    /// Render the canonical YAML snapshot
    ///
    /// # Errors
    /// Returns error if YAML serialization fails
    pub fn to_snapshot_string(&self) -> Result<String, TopologyError> {
        let mut resources = Mapping::new();
        for resource in &self.resources {
            resources.insert(
                Value::String(resource.id.to_string()),
                serde_yaml::to_value(&resource.properties)?,
            );
        }

        let mut edges = Mapping::new();
        for edge in &self.edges {
            edges.insert(Value::String(edge.to_string()), Value::Null);
        }

        let mut root = Mapping::new();
        root.insert(Value::String(RESOURCES.to_string()), Value::Mapping(resources));
        root.insert(Value::String(EDGES.to_string()), Value::Mapping(edges));
        Ok(serde_yaml::to_string(&Value::Mapping(root))?)
    }
}

impl FromStr for Topology {
    type Err = TopologyError;

    fn from_str(snapshot: &str) -> Result<Self, Self::Err> {
        Self::from_slice(snapshot.as_bytes())
    }
}

fn section(root: &mut Mapping, name: &'static str) -> Result<Option<Mapping>, TopologyError> {
    match root.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(map)) => Ok(Some(map)),
        Some(_) => Err(TopologyError::InvalidSection(name)),
    }
}

fn parse_resource(key: String, props: Value) -> Result<Resource, TopologyError> {
    let id: ResourceId = key.parse()?;
    let properties = match PropertyValue::from(props) {
        PropertyValue::Mapping(map) => map,
        PropertyValue::Scalar(Scalar::Null) => PropertyMap::new(),
        _ => return Err(TopologyError::InvalidProperties(key)),
    };
    Ok(Resource::new(id, properties))
}
