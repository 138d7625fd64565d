//! Entries of the M-tree.
//!
//! Metric entries store object ids only. Every entry remembers its distance
//! to the routing object of the node that holds it, which lets queries
//! discard entries by the triangle inequality without computing a distance.
//!
//! Trees that answer reverse nearest-neighbor queries also keep, per object,
//! the distance to its `k_max`-th nearest neighbor, and per subtree the
//! largest such distance below it.

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeEntries};
use crate::types::{ObjectId, PageId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricLeafEntry {
    pub id: ObjectId,
    /// Distance to the routing object of the enclosing node; 0 in the root.
    pub parent_distance: f64,
    /// Distance to the `k_max`-th nearest neighbor, the object itself
    /// included. Infinite while fewer than `k_max` objects are indexed, 0 in
    /// trees that do not keep it.
    pub knn_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDirectoryEntry {
    pub page_id: PageId,
    /// Object the ball of this subtree is centered on.
    pub routing_id: ObjectId,
    /// Every object below lies within this distance of the routing object.
    pub covering_radius: f64,
    pub parent_distance: f64,
    /// Largest `knn_distance` of the objects below.
    pub knn_distance: f64,
}

pub type MetricNode = Node<MetricLeafEntry, MetricDirectoryEntry>;

/// What the split policies need to know about an entry.
pub trait MetricEntry {
    /// The object this entry is centered on.
    fn object_id(&self) -> ObjectId;

    /// Radius of the ball the entry stands for; 0 for objects.
    fn radius(&self) -> f64;

    fn parent_distance(&self) -> f64;

    fn set_parent_distance(&mut self, distance: f64);

    fn knn_distance(&self) -> f64;
}

impl MetricEntry for MetricLeafEntry {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn radius(&self) -> f64 {
        0.0
    }

    fn parent_distance(&self) -> f64 {
        self.parent_distance
    }

    fn set_parent_distance(&mut self, distance: f64) {
        self.parent_distance = distance;
    }

    fn knn_distance(&self) -> f64 {
        self.knn_distance
    }
}

impl MetricEntry for MetricDirectoryEntry {
    fn object_id(&self) -> ObjectId {
        self.routing_id
    }

    fn radius(&self) -> f64 {
        self.covering_radius
    }

    fn parent_distance(&self) -> f64 {
        self.parent_distance
    }

    fn set_parent_distance(&mut self, distance: f64) {
        self.parent_distance = distance;
    }

    fn knn_distance(&self) -> f64 {
        self.knn_distance
    }
}

/// Smallest radius around a node's routing object that covers all its
/// entries, computed from the stored parent distances.
pub fn covering_radius(node: &MetricNode) -> f64 {
    match &node.entries {
        NodeEntries::Leaf(entries) => enclosing_radius(entries),
        NodeEntries::Directory(entries) => enclosing_radius(entries),
    }
}

pub(crate) fn enclosing_radius<E: MetricEntry>(entries: &[E]) -> f64 {
    entries
        .iter()
        .map(|e| e.parent_distance() + e.radius())
        .fold(0.0, f64::max)
}

/// Largest k-nearest-neighbor distance kept in a node.
pub fn knn_aggregate(node: &MetricNode) -> f64 {
    fn largest<E: MetricEntry>(entries: &[E]) -> f64 {
        entries.iter().map(|e| e.knn_distance()).fold(0.0, f64::max)
    }
    match &node.entries {
        NodeEntries::Leaf(entries) => largest(entries),
        NodeEntries::Directory(entries) => largest(entries),
    }
}

/// Ids of the objects a node's entries are centered on.
pub(crate) fn entry_objects(node: &MetricNode) -> Vec<ObjectId> {
    match &node.entries {
        NodeEntries::Leaf(entries) => entries.iter().map(|e| e.id).collect(),
        NodeEntries::Directory(entries) => entries.iter().map(|e| e.routing_id).collect(),
    }
}
