//! Structural diff between two topologies
//!
//! Resources and edges are compared as sets keyed by identity. Property trees
//! are compared only on request, leaf by leaf, producing dotted/bracketed
//! paths such as `env.TABLE` or `subnets[1].cidr`.

use crate::resource::{Edge, ResourceId};
use crate::topology::Topology;
use crate::value::{PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Status of one diff entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffStatus {
    /// Present in current, absent from previous
    Added,
    /// Present in previous, absent from current
    Removed,
    /// Present in both with differing properties
    Changed,
}

impl DiffStatus {
    /// Added or removed, i.e. the graph shape changed
    #[inline]
    #[must_use]
    pub fn is_topological(self) -> bool {
        matches!(self, Self::Added | Self::Removed)
    }
}

/// Old/new pair for one property leaf
///
/// A side is `None` when the key or index does not exist there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Value in the previous topology
    pub previous: Option<PropertyValue>,
    /// Value in the current topology
    pub current: Option<PropertyValue>,
}

/// Property changes keyed by path
pub type PropertyChanges = BTreeMap<String, PropertyChange>;

/// One resource or edge in a [`TopologyDiff`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// What happened to the element
    pub status: DiffStatus,

    /// Changed leaves, only for `CHANGED` resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyChanges>,

    /// Edge target, only for edge entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceId>,
}

impl DiffEntry {
    fn status(status: DiffStatus) -> Self {
        Self {
            status,
            properties: None,
            target: None,
        }
    }

    fn changed(properties: PropertyChanges) -> Self {
        Self {
            status: DiffStatus::Changed,
            properties: Some(properties),
            target: None,
        }
    }

    fn edge(status: DiffStatus, target: &ResourceId) -> Self {
        Self {
            status,
            properties: None,
            target: Some(target.clone()),
        }
    }
}

/// Result of [`diff`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDiff {
    /// Resource entries
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, DiffEntry>,

    /// Edge entries keyed by `(source, target)`
    #[serde(default)]
    pub edges: BTreeMap<Edge, DiffEntry>,
}

impl TopologyDiff {
    /// Empty diff
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Any entry at all
    #[inline]
    #[must_use]
    pub fn has_differences(&self) -> bool {
        !self.resources.is_empty() || !self.edges.is_empty()
    }

    /// Any ADDED or REMOVED resource or edge
    #[must_use]
    pub fn has_topological_changes(&self) -> bool {
        self.resources
            .values()
            .chain(self.edges.values())
            .any(|entry| entry.status.is_topological())
    }

    /// Copy containing only ADDED/REMOVED entries
    #[must_use]
    pub fn topological_changes(&self) -> Self {
        Self {
            resources: self
                .resources
                .iter()
                .filter(|(_, e)| e.status.is_topological())
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|(_, e)| e.status.is_topological())
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }

    /// Resource ids with the given status
    pub fn resources_with(&self, status: DiffStatus) -> impl Iterator<Item = &ResourceId> {
        self.resources
            .iter()
            .filter(move |(_, e)| e.status == status)
            .map(|(id, _)| id)
    }

    /// Edge entries keyed by source only
    ///
    /// When one source has several differing edges, the entry with the
    /// greatest target wins.
    #[must_use]
    pub fn edges_by_source(&self) -> BTreeMap<ResourceId, DiffEntry> {
        self.edges
            .iter()
            .map(|(edge, entry)| (edge.source.clone(), entry.clone()))
            .collect()
    }

    /// Total number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len() + self.edges.len()
    }

    /// No entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_differences()
    }
}

/// Diff `current` against `previous`
///
/// Ids only in `current` are `ADDED`, ids only in `previous` are `REMOVED`.
/// With `include_properties`, ids in both whose property trees differ are
/// `CHANGED`. Output does not depend on resource or edge order.
#[must_use]
pub fn diff(current: &Topology, previous: &Topology, include_properties: bool) -> TopologyDiff {
    let mut out = TopologyDiff::new();

    let current_props: HashMap<&ResourceId, &PropertyMap> = current
        .resources()
        .iter()
        .map(|r| (&r.id, &r.properties))
        .collect();
    let previous_props: HashMap<&ResourceId, &PropertyMap> = previous
        .resources()
        .iter()
        .map(|r| (&r.id, &r.properties))
        .collect();

    for (id, props) in &current_props {
        match previous_props.get(id) {
            None => {
                out.resources
                    .insert((*id).clone(), DiffEntry::status(DiffStatus::Added));
            }
            Some(previous) if include_properties => {
                let changes = diff_properties(props, previous);
                if !changes.is_empty() {
                    out.resources.insert((*id).clone(), DiffEntry::changed(changes));
                }
            }
            Some(_) => {}
        }
    }
    for id in previous_props.keys() {
        if !current_props.contains_key(id) {
            out.resources
                .insert((*id).clone(), DiffEntry::status(DiffStatus::Removed));
        }
    }

    let current_edges = current.edge_set();
    let previous_edges = previous.edge_set();
    for edge in current_edges.difference(&previous_edges) {
        out.edges.insert(
            (*edge).clone(),
            DiffEntry::edge(DiffStatus::Added, &edge.target),
        );
    }
    for edge in previous_edges.difference(&current_edges) {
        out.edges.insert(
            (*edge).clone(),
            DiffEntry::edge(DiffStatus::Removed, &edge.target),
        );
    }

    out
}

/// Leaf-level changes between two property mappings
#[must_use]
pub fn diff_properties(current: &PropertyMap, previous: &PropertyMap) -> PropertyChanges {
    let mut changes = PropertyChanges::new();
    walk_mapping("", current, previous, &mut changes);
    changes
}

fn walk_mapping(
    path: &str,
    current: &PropertyMap,
    previous: &PropertyMap,
    out: &mut PropertyChanges,
) {
    let keys = previous
        .keys()
        .chain(current.keys().filter(|k| !previous.contains_key(*k)));
    for key in keys {
        let child = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        walk(&child, current.get(key), previous.get(key), out);
    }
}

fn walk(
    path: &str,
    current: Option<&PropertyValue>,
    previous: Option<&PropertyValue>,
    out: &mut PropertyChanges,
) {
    match (current, previous) {
        (Some(PropertyValue::Mapping(c)), Some(PropertyValue::Mapping(p))) => {
            walk_mapping(path, c, p, out);
        }
        (Some(PropertyValue::Sequence(c)), Some(PropertyValue::Sequence(p))) => {
            for i in 0..c.len().max(p.len()) {
                walk(&format!("{path}[{i}]"), c.get(i), p.get(i), out);
            }
        }
        (Some(PropertyValue::Scalar(c)), Some(PropertyValue::Scalar(p))) if c == p => {}
        _ => {
            out.insert(
                path.to_string(),
                PropertyChange {
                    previous: previous.cloned(),
                    current: current.cloned(),
                },
            );
        }
    }
}
