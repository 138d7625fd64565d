//! Best-first traversal shared by the spatial and metric trees.
//!
//! A tree plugs in through [`Expander`], which turns a node candidate into
//! candidates for its children together with a lower bound on the distance
//! of anything below them. The drivers here order candidates, prune them
//! and collect results.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::errors::{IndexError, IndexResult};
use crate::types::{sort_results, DistanceResult, ObjectId, PageId, QueryStats};

/// Whether a candidate is a finished object or a node still to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CandidateKind {
    Object,
    Node,
}

/// A pending entry of a best-first traversal.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Exact distance for objects, a lower bound for nodes.
    pub bound: f64,
    pub kind: CandidateKind,
    /// Object id or page id.
    pub id: u64,
    /// Distance from the query to the object routing this node, if the
    /// tree has one.
    pub routing_distance: Option<f64>,
}

impl Candidate {
    pub fn object(id: ObjectId, distance: f64) -> Self {
        Self {
            bound: distance,
            kind: CandidateKind::Object,
            id,
            routing_distance: None,
        }
    }

    pub fn node(page_id: PageId, bound: f64, routing_distance: Option<f64>) -> Self {
        Self {
            bound,
            kind: CandidateKind::Node,
            id: page_id,
            routing_distance,
        }
    }

    /// Order of expansion: bound, then objects before nodes, then id.
    fn priority_cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then(self.kind.cmp(&other.kind))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.priority_cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // reversed so that `BinaryHeap` pops the smallest candidate first
    fn cmp(&self, other: &Self) -> Ordering {
        other.priority_cmp(self)
    }
}

/// The tree-specific part of a traversal.
pub trait Expander {
    /// Candidate for the root node; `None` for an empty tree.
    fn root(&self) -> IndexResult<Option<Candidate>>;

    /// Pushes the children of `node` whose bound does not exceed `limit`
    /// into `out`; others are counted as pruned.
    fn expand(
        &self,
        node: &Candidate,
        limit: f64,
        out: &mut Vec<Candidate>,
        stats: &mut QueryStats,
    ) -> IndexResult<()>;
}

/// The `k` nearest results seen so far, keeping ties at the k-th distance.
#[derive(Debug, Clone)]
pub struct KnnHeap {
    k: usize,
    /// Ascending by (distance, id).
    results: Vec<DistanceResult>,
}

impl KnnHeap {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            results: Vec::new(),
        }
    }

    /// Distance a new result must not exceed to be kept.
    pub fn k_distance(&self) -> f64 {
        if self.k == 0 {
            return f64::NEG_INFINITY;
        }
        if self.results.len() < self.k {
            f64::INFINITY
        } else {
            self.results[self.k - 1].distance
        }
    }

    pub fn insert(&mut self, result: DistanceResult) {
        if result.distance > self.k_distance() {
            return;
        }
        let pos = self
            .results
            .partition_point(|r| r.total_cmp(&result) == Ordering::Less);
        self.results.insert(pos, result);
        if self.results.len() > self.k {
            let kth = self.results[self.k - 1].distance;
            let keep = self.results.partition_point(|r| r.distance <= kth);
            self.results.truncate(keep);
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_sorted_vec(self) -> Vec<DistanceResult> {
        self.results
    }
}

/// Rejects negative and NaN query radii.
pub(crate) fn check_radius(radius: f64) -> IndexResult<()> {
    if radius.is_nan() || radius < 0.0 {
        return Err(IndexError::InvalidInput(format!(
            "radius {} must be a non-negative number",
            radius
        )));
    }
    Ok(())
}

/// All objects within `radius`, sorted by (distance, id).
pub fn range_search<X: Expander>(
    expander: &X,
    radius: f64,
    stats: &mut QueryStats,
) -> IndexResult<Vec<DistanceResult>> {
    let mut results = Vec::new();
    let Some(root) = expander.root()? else {
        return Ok(results);
    };
    let mut stack = vec![root];
    let mut children = Vec::new();
    while let Some(node) = stack.pop() {
        children.clear();
        expander.expand(&node, radius, &mut children, stats)?;
        for child in children.drain(..) {
            match child.kind {
                CandidateKind::Object => results.push(DistanceResult::new(child.id, child.bound)),
                CandidateKind::Node => stack.push(child),
            }
        }
    }
    sort_results(&mut results);
    Ok(results)
}

/// The `k` nearest objects, ties at the k-th distance included.
pub fn knn_search<X: Expander>(
    expander: &X,
    k: usize,
    stats: &mut QueryStats,
) -> IndexResult<Vec<DistanceResult>> {
    let mut knn = KnnHeap::new(k);
    if k == 0 {
        return Ok(Vec::new());
    }
    let Some(root) = expander.root()? else {
        return Ok(Vec::new());
    };
    let mut pending = BinaryHeap::new();
    pending.push(root);
    let mut children = Vec::new();
    while let Some(node) = pending.pop() {
        if node.bound > knn.k_distance() {
            break;
        }
        children.clear();
        expander.expand(&node, knn.k_distance(), &mut children, stats)?;
        for child in children.drain(..) {
            match child.kind {
                CandidateKind::Object => knn.insert(DistanceResult::new(child.id, child.bound)),
                CandidateKind::Node => pending.push(child),
            }
        }
    }
    Ok(knn.into_sorted_vec())
}

/// Lazy best-first iteration over all objects by ascending distance.
///
/// Every call to `next` expands nodes until the nearest pending candidate
/// is an object. Dropping the iterator early has no side effects.
pub struct PrioritySearch<X: Expander> {
    expander: X,
    pending: BinaryHeap<Candidate>,
    stats: QueryStats,
    buffer: Vec<Candidate>,
    failed: bool,
}

impl<X: Expander> PrioritySearch<X> {
    pub fn new(expander: X) -> IndexResult<Self> {
        let mut pending = BinaryHeap::new();
        if let Some(root) = expander.root()? {
            pending.push(root);
        }
        Ok(Self {
            expander,
            pending,
            stats: QueryStats::default(),
            buffer: Vec::new(),
            failed: false,
        })
    }

    /// Counters of the work done so far.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }
}

impl<X: Expander> Iterator for PrioritySearch<X> {
    type Item = IndexResult<DistanceResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(candidate) = self.pending.pop() {
            match candidate.kind {
                CandidateKind::Object => {
                    return Some(Ok(DistanceResult::new(candidate.id, candidate.bound)));
                }
                CandidateKind::Node => {
                    self.buffer.clear();
                    if let Err(e) = self.expander.expand(
                        &candidate,
                        f64::INFINITY,
                        &mut self.buffer,
                        &mut self.stats,
                    ) {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    self.pending.extend(self.buffer.drain(..));
                }
            }
        }
        None
    }
}
