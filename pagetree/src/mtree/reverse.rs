//! Reverse k-nearest-neighbor queries on the M-tree.
//!
//! A tree built with `k_max` keeps, for every object, the distance to its
//! `k_max`-th nearest neighbor (the object itself counts as its own first
//! neighbor). A directory entry carries the largest such distance below it.
//! An object `o` has the query `q` among its `k` nearest neighbors when
//! `d(o, q)` does not exceed the k-nearest-neighbor distance of `o`, so a
//! subtree whose ball lies farther from `q` than its largest stored distance
//! holds no answer.
//!
//! For `k == k_max` the stored distances decide directly. Smaller `k` reuse
//! the same traversal for candidates and then check each candidate with a
//! k-nearest-neighbor query of its own.

use log::debug;

use crate::distance::DistanceFunction;
use crate::errors::{IndexError, IndexResult};
use crate::mtree::entry::knn_aggregate;
use crate::mtree::query::{ball_bound, MetricExpander};
use crate::mtree::tree::{within_radius, MTree};
use crate::node::NodeEntries;
use crate::relation::Relation;
use crate::search::{self, Candidate, Expander};
use crate::types::{sort_results, DistanceResult, ObjectId, PageId, QueryStats};

/// Expands metric nodes for a reverse nearest-neighbor query, pruning each
/// entry by its own stored neighbor distance instead of a query radius.
pub struct ReverseExpander<'a, R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    inner: MetricExpander<'a, R, D>,
}

impl<R, D> Expander for ReverseExpander<'_, R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    fn root(&self) -> IndexResult<Option<Candidate>> {
        self.inner.root()
    }

    // `limit` is ignored; every entry is bounded by its own knn distance
    fn expand(
        &self,
        node: &Candidate,
        _limit: f64,
        out: &mut Vec<Candidate>,
        stats: &mut QueryStats,
    ) -> IndexResult<()> {
        let page = self.inner.tree.read_node(node.id)?;
        stats.node_reads += 1;
        match &page.entries {
            NodeEntries::Leaf(entries) => {
                for entry in entries {
                    if self.inner.prunable(entry, node.routing_distance, entry.knn_distance) {
                        stats.pruned_entries += 1;
                        continue;
                    }
                    let d = self.inner.query_distance(entry.id, stats)?;
                    if within_radius(d, entry.knn_distance) {
                        out.push(Candidate::object(entry.id, d));
                    } else {
                        stats.pruned_entries += 1;
                    }
                }
            }
            NodeEntries::Directory(entries) => {
                for entry in entries {
                    if self.inner.prunable(entry, node.routing_distance, entry.knn_distance) {
                        stats.pruned_entries += 1;
                        continue;
                    }
                    let d = self.inner.query_distance(entry.routing_id, stats)?;
                    let bound = ball_bound(d, entry.covering_radius);
                    if bound <= entry.knn_distance {
                        out.push(Candidate::node(entry.page_id, bound, Some(d)));
                    } else {
                        stats.pruned_entries += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<R, D> MTree<R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    /// All objects that have `query` among their `k` nearest neighbors,
    /// ascending by (distance, id). Ties at an object's k-th distance count
    /// in favor of `query`.
    ///
    /// Needs a tree built with [`reverse_knn`](crate::config::MTreeConfigBuilder::reverse_knn)
    /// and `1 <= k <= k_max`.
    pub fn reverse_knn_search(&self, query: &R::Object, k: usize) -> IndexResult<Vec<DistanceResult>> {
        self.reverse_knn_search_with_stats(query, k)
            .map(|(results, _)| results)
    }

    pub fn reverse_knn_search_with_stats(
        &self,
        query: &R::Object,
        k: usize,
    ) -> IndexResult<(Vec<DistanceResult>, QueryStats)> {
        self.check_open()?;
        let k_max = self.k_max().ok_or_else(|| {
            IndexError::InvalidOperation("tree keeps no nearest-neighbor distances".into())
        })?;
        if k == 0 || k > k_max {
            return Err(IndexError::InvalidInput(format!(
                "k = {} must lie between 1 and {}",
                k, k_max
            )));
        }
        let mut stats = QueryStats::default();
        let expander = ReverseExpander {
            inner: MetricExpander::new(self, query),
        };
        let candidates = search::range_search(&expander, f64::INFINITY, &mut stats)?;
        if k == k_max {
            return Ok((candidates, stats));
        }

        let count = candidates.len();
        let mut results = Vec::new();
        for candidate in candidates {
            let (neighbors, knn_stats) = self.knn_search_with_stats(self.relation.fetch(candidate.id)?, k)?;
            stats.merge(&knn_stats);
            if within_radius(candidate.distance, kth_distance(&neighbors, k)) {
                results.push(candidate);
            }
        }
        debug!("Reverse {}-NN refinement kept {} of {} candidates", k, results.len(), count);
        sort_results(&mut results);
        Ok((results, stats))
    }

    pub fn reverse_knn_search_by_id(&self, id: ObjectId, k: usize) -> IndexResult<Vec<DistanceResult>> {
        self.reverse_knn_search(self.relation.fetch(id)?, k)
    }

    /// Distance from the indexed object `id` to its `k`-th nearest
    /// neighbor, itself included; infinite while fewer than `k` objects are
    /// indexed.
    pub(crate) fn knn_distance_of(&self, id: ObjectId, k: usize) -> IndexResult<f64> {
        let neighbors = self.knn_search_by_id(id, k)?;
        Ok(kth_distance(&neighbors, k))
    }

    /// Recomputes the stored neighbor distances after `changed` was inserted
    /// or deleted, or all of them for `None`.
    ///
    /// Only objects that have `changed` within their stored distance can be
    /// affected, and new entries carry an infinite distance, so the pass
    /// visits the subtrees a reverse query for `changed` would.
    pub(crate) fn refresh_knn_distances(&mut self, changed: Option<ObjectId>) -> IndexResult<()> {
        let (Some(k_max), Some(root)) = (self.k_max(), self.root_page()) else {
            return Ok(());
        };
        self.refresh_subtree(root, changed, k_max)?;
        Ok(())
    }

    /// Refreshes the leaf distances below `page_id` and returns the new
    /// aggregate of the node. Unchanged nodes are not written back.
    fn refresh_subtree(&self, page_id: PageId, changed: Option<ObjectId>, k_max: usize) -> IndexResult<f64> {
        let mut node = self.read_node(page_id)?;
        let mut dirty = false;
        match &mut node.entries {
            NodeEntries::Leaf(entries) => {
                for entry in entries.iter_mut() {
                    if let Some(x) = changed {
                        if !within_radius(self.distance_between(entry.id, x)?, entry.knn_distance) {
                            continue;
                        }
                    }
                    let knn = self.knn_distance_of(entry.id, k_max)?;
                    if knn != entry.knn_distance {
                        entry.knn_distance = knn;
                        dirty = true;
                    }
                }
            }
            NodeEntries::Directory(entries) => {
                for entry in entries.iter_mut() {
                    if let Some(x) = changed {
                        let d = self.distance_between(entry.routing_id, x)?;
                        if ball_bound(d, entry.covering_radius) > entry.knn_distance {
                            continue;
                        }
                    }
                    let knn = self.refresh_subtree(entry.page_id, changed, k_max)?;
                    if knn != entry.knn_distance {
                        entry.knn_distance = knn;
                        dirty = true;
                    }
                }
            }
        }
        let aggregate = knn_aggregate(&node);
        if dirty {
            self.write_node(node)?;
        }
        Ok(aggregate)
    }
}

fn kth_distance(neighbors: &[DistanceResult], k: usize) -> f64 {
    match k.checked_sub(1).and_then(|i| neighbors.get(i)) {
        Some(result) => result.distance,
        None => f64::INFINITY,
    }
}
