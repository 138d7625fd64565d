//! Range, k-nearest-neighbor and priority queries on the M-tree.
//!
//! A subtree is bounded below by `d(q, routing) - covering_radius`. Before
//! computing that distance, the stored parent distance gives the cheaper
//! bound `|d(q, parent) - parent_distance| - covering_radius`, which needs
//! only the distance already known for the enclosing node.

use crate::distance::DistanceFunction;
use crate::errors::IndexResult;
use crate::mtree::entry::MetricEntry;
use crate::mtree::tree::{MTree, RADIUS_TOLERANCE};
use crate::node::NodeEntries;
use crate::relation::Relation;
use crate::search::{self, check_radius, Candidate, Expander, PrioritySearch};
use crate::types::{DistanceResult, ObjectId, QueryStats};

/// Lower bound on the distance from a query to anything in a ball of
/// `radius` around an object at `distance`, loosened by the rounding slack.
pub(crate) fn ball_bound(distance: f64, radius: f64) -> f64 {
    (distance - radius - RADIUS_TOLERANCE * (distance + radius)).max(0.0)
}

/// Expands metric nodes for one query object.
pub struct MetricExpander<'a, R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    pub(crate) tree: &'a MTree<R, D>,
    query: &'a R::Object,
}

impl<'a, R, D> MetricExpander<'a, R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    pub(crate) fn new(tree: &'a MTree<R, D>, query: &'a R::Object) -> Self {
        Self { tree, query }
    }

    /// True if the parent-distance test rules out `entry` without
    /// computing its distance.
    pub(crate) fn prunable<E: MetricEntry>(&self, entry: &E, routing_distance: Option<f64>, limit: f64) -> bool {
        match routing_distance {
            Some(dp) => ball_bound((dp - entry.parent_distance()).abs(), entry.radius()) > limit,
            None => false,
        }
    }

    pub(crate) fn query_distance(&self, id: ObjectId, stats: &mut QueryStats) -> IndexResult<f64> {
        stats.distance_computations += 1;
        self.tree
            .distance
            .distance(self.query, self.tree.relation.fetch(id)?)
    }
}

impl<R, D> Expander for MetricExpander<'_, R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    fn root(&self) -> IndexResult<Option<Candidate>> {
        Ok(self
            .tree
            .root_page()
            .map(|page_id| Candidate::node(page_id, 0.0, None)))
    }

    fn expand(
        &self,
        node: &Candidate,
        limit: f64,
        out: &mut Vec<Candidate>,
        stats: &mut QueryStats,
    ) -> IndexResult<()> {
        let page = self.tree.read_node(node.id)?;
        stats.node_reads += 1;
        match &page.entries {
            NodeEntries::Leaf(entries) => {
                for entry in entries {
                    if self.prunable(entry, node.routing_distance, limit) {
                        stats.pruned_entries += 1;
                        continue;
                    }
                    let d = self.query_distance(entry.id, stats)?;
                    if d <= limit {
                        out.push(Candidate::object(entry.id, d));
                    } else {
                        stats.pruned_entries += 1;
                    }
                }
            }
            NodeEntries::Directory(entries) => {
                for entry in entries {
                    if self.prunable(entry, node.routing_distance, limit) {
                        stats.pruned_entries += 1;
                        continue;
                    }
                    let d = self.query_distance(entry.routing_id, stats)?;
                    let bound = ball_bound(d, entry.covering_radius);
                    if bound <= limit {
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
    /// All objects within `radius` of `query`, ascending by (distance, id).
    pub fn range_search(&self, query: &R::Object, radius: f64) -> IndexResult<Vec<DistanceResult>> {
        self.range_search_with_stats(query, radius).map(|(results, _)| results)
    }

    pub fn range_search_with_stats(
        &self,
        query: &R::Object,
        radius: f64,
    ) -> IndexResult<(Vec<DistanceResult>, QueryStats)> {
        self.check_open()?;
        check_radius(radius)?;
        let mut stats = QueryStats::default();
        let results = search::range_search(&MetricExpander::new(self, query), radius, &mut stats)?;
        Ok((results, stats))
    }

    /// The `k` nearest objects to `query`, ties at the k-th distance
    /// included.
    pub fn knn_search(&self, query: &R::Object, k: usize) -> IndexResult<Vec<DistanceResult>> {
        self.knn_search_with_stats(query, k).map(|(results, _)| results)
    }

    pub fn knn_search_with_stats(
        &self,
        query: &R::Object,
        k: usize,
    ) -> IndexResult<(Vec<DistanceResult>, QueryStats)> {
        self.check_open()?;
        let mut stats = QueryStats::default();
        let results = search::knn_search(&MetricExpander::new(self, query), k, &mut stats)?;
        Ok((results, stats))
    }

    /// Lazily yields all objects by ascending distance to `query`.
    pub fn priority_search<'a>(
        &'a self,
        query: &'a R::Object,
    ) -> IndexResult<PrioritySearch<MetricExpander<'a, R, D>>> {
        self.check_open()?;
        PrioritySearch::new(MetricExpander::new(self, query))
    }

    pub fn range_search_by_id(&self, id: ObjectId, radius: f64) -> IndexResult<Vec<DistanceResult>> {
        self.range_search(self.relation.fetch(id)?, radius)
    }

    pub fn knn_search_by_id(&self, id: ObjectId, k: usize) -> IndexResult<Vec<DistanceResult>> {
        self.knn_search(self.relation.fetch(id)?, k)
    }

    pub fn priority_search_by_id(
        &self,
        id: ObjectId,
    ) -> IndexResult<PrioritySearch<MetricExpander<'_, R, D>>> {
        self.priority_search(self.relation.fetch(id)?)
    }
}
