//! Core identifiers and result types used throughout the index.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Opaque identifier of an indexed object (a relation id).
pub type ObjectId = u64;

/// Page ID - unique identifier for a node/page in the page file
pub type PageId = u64;

/// The tree family stored in a page file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    RStar,
    XTree,
    MTree,
}

/// One query answer: an object id and its exact distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceResult {
    pub id: ObjectId,
    pub distance: f64,
}

impl DistanceResult {
    pub fn new(id: ObjectId, distance: f64) -> Self {
        Self { id, distance }
    }

    /// Total order by distance, then id. Distances are never NaN once they
    /// leave a distance function.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Sorts results ascending by (distance, id).
pub fn sort_results(results: &mut [DistanceResult]) {
    results.sort_by(DistanceResult::total_cmp);
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics about a tree and its page file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStats {
    pub total_entries: u64,
    pub tree_height: usize,
    pub leaf_capacity: usize,
    pub directory_capacity: usize,
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub page_reads: u64,
    pub page_writes: u64,
    pub allocated_pages: u64,
    pub free_pages: u64,
}

/// Per-query execution counters.
///
/// Owned by whoever runs the query; nothing here is global.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Number of calls into the distance function (object or bound).
    pub distance_computations: u64,
    /// Number of nodes read while answering the query.
    pub node_reads: u64,
    /// Entries discarded by a bound without descending or evaluating them.
    pub pruned_entries: u64,
}

impl QueryStats {
    pub fn merge(&mut self, other: &QueryStats) {
        self.distance_computations += other.distance_computations;
        self.node_reads += other.node_reads;
        self.pruned_entries += other.pruned_entries;
    }
}
