//! Range, k-nearest-neighbor and priority queries on the spatial trees.

use crate::distance::SpatialDistance;
use crate::errors::IndexResult;
use crate::node::NodeEntries;
use crate::relation::Relation;
use crate::rtree::tree::RStarTree;
use crate::search::{self, check_radius, Candidate, Expander, PrioritySearch};
use crate::types::{DistanceResult, ObjectId, QueryStats};

/// Expands spatial nodes for one query point.
pub struct SpatialExpander<'a, D: SpatialDistance> {
    tree: &'a RStarTree<D>,
    query: Vec<f64>,
    /// Skip objects already marked as handled.
    unhandled_only: bool,
}

impl<'a, D: SpatialDistance> SpatialExpander<'a, D> {
    pub(crate) fn new(tree: &'a RStarTree<D>, query: &[f64], unhandled_only: bool) -> Self {
        Self {
            tree,
            query: query.to_vec(),
            unhandled_only,
        }
    }
}

impl<D: SpatialDistance> Expander for SpatialExpander<'_, D> {
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
                    if self.unhandled_only && entry.handled {
                        continue;
                    }
                    let d = self
                        .tree
                        .distance
                        .distance(self.query.as_slice(), entry.point.as_slice())?;
                    stats.distance_computations += 1;
                    if d <= limit {
                        out.push(Candidate::object(entry.id, d));
                    } else {
                        stats.pruned_entries += 1;
                    }
                }
            }
            NodeEntries::Directory(entries) => {
                for entry in entries {
                    if self.unhandled_only && !entry.has_unhandled {
                        stats.pruned_entries += 1;
                        continue;
                    }
                    let bound = self.tree.distance.min_dist(&self.query, &entry.mbr)?;
                    stats.distance_computations += 1;
                    if bound <= limit {
                        out.push(Candidate::node(entry.page_id, bound, None));
                    } else {
                        stats.pruned_entries += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<D: SpatialDistance> RStarTree<D> {
    /// All objects within `radius` of `query`, ascending by (distance, id).
    pub fn range_search(&self, query: &[f64], radius: f64) -> IndexResult<Vec<DistanceResult>> {
        self.range_search_with_stats(query, radius).map(|(results, _)| results)
    }

    pub fn range_search_with_stats(
        &self,
        query: &[f64],
        radius: f64,
    ) -> IndexResult<(Vec<DistanceResult>, QueryStats)> {
        self.check_open()?;
        self.check_query(query)?;
        check_radius(radius)?;
        let mut stats = QueryStats::default();
        let results = search::range_search(&SpatialExpander::new(self, query, false), radius, &mut stats)?;
        Ok((results, stats))
    }

    /// The `k` nearest objects to `query`. Objects tied with the k-th
    /// distance are all returned.
    pub fn knn_search(&self, query: &[f64], k: usize) -> IndexResult<Vec<DistanceResult>> {
        self.knn_search_with_stats(query, k).map(|(results, _)| results)
    }

    pub fn knn_search_with_stats(
        &self,
        query: &[f64],
        k: usize,
    ) -> IndexResult<(Vec<DistanceResult>, QueryStats)> {
        self.check_open()?;
        self.check_query(query)?;
        let mut stats = QueryStats::default();
        let results = search::knn_search(&SpatialExpander::new(self, query, false), k, &mut stats)?;
        Ok((results, stats))
    }

    /// Lazily yields all objects by ascending distance to `query`.
    pub fn priority_search(&self, query: &[f64]) -> IndexResult<PrioritySearch<SpatialExpander<'_, D>>> {
        self.check_open()?;
        self.check_query(query)?;
        PrioritySearch::new(SpatialExpander::new(self, query, false))
    }

    pub fn range_search_by_id<R>(
        &self,
        relation: &R,
        id: ObjectId,
        radius: f64,
    ) -> IndexResult<Vec<DistanceResult>>
    where
        R: Relation,
        R::Object: AsRef<[f64]>,
    {
        self.range_search(relation.fetch(id)?.as_ref(), radius)
    }

    pub fn knn_search_by_id<R>(
        &self,
        relation: &R,
        id: ObjectId,
        k: usize,
    ) -> IndexResult<Vec<DistanceResult>>
    where
        R: Relation,
        R::Object: AsRef<[f64]>,
    {
        self.knn_search(relation.fetch(id)?.as_ref(), k)
    }

    pub fn priority_search_by_id<R>(
        &self,
        relation: &R,
        id: ObjectId,
    ) -> IndexResult<PrioritySearch<SpatialExpander<'_, D>>>
    where
        R: Relation,
        R::Object: AsRef<[f64]>,
    {
        self.priority_search(relation.fetch(id)?.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::distance::{Euclidean, Manhattan};
    use crate::errors::IndexError;
    use crate::relation::VecRelation;

    fn grid_tree() -> RStarTree {
        let config = TreeConfig::builder().node_capacity(4).build().unwrap();
        let mut tree = RStarTree::in_memory(config, Euclidean).unwrap();
        let mut id = 0;
        for x in 0..6 {
            for y in 0..6 {
                tree.insert(id, &[x as f64, y as f64]).unwrap();
                id += 1;
            }
        }
        tree
    }

    fn ids(results: &[DistanceResult]) -> Vec<ObjectId> {
        results.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_range_search_on_grid() {
        let tree = grid_tree();
        // (2,2) has id 14; its four neighbours lie at distance 1
        let (results, stats) = tree.range_search_with_stats(&[2.0, 2.0], 1.0).unwrap();
        assert_eq!(ids(&results), vec![14, 8, 13, 15, 20]);
        assert_eq!(results[0].distance, 0.0);
        assert!(stats.node_reads >= 2);
        assert!(stats.pruned_entries > 0);
    }

    #[test]
    fn test_zero_radius_finds_coincident_point() {
        let tree = grid_tree();
        let results = tree.range_search(&[3.0, 4.0], 0.0).unwrap();
        assert_eq!(ids(&results), vec![22]);
        assert!(tree.range_search(&[3.5, 4.0], 0.0).unwrap().is_empty());
    }

    #[test]
    fn test_knn_keeps_ties() {
        let tree = grid_tree();
        let results = tree.knn_search(&[2.5, 2.5], 1).unwrap();
        assert_eq!(ids(&results), vec![14, 15, 20, 21]);
        assert!(tree.knn_search(&[0.0, 0.0], 0).unwrap().is_empty());
        assert_eq!(tree.knn_search(&[0.0, 0.0], 100).unwrap().len(), 36);
    }

    #[test]
    fn test_priority_search_is_ascending() {
        let tree = grid_tree();
        let results: Vec<DistanceResult> = tree
            .priority_search(&[1.2, 4.9])
            .unwrap()
            .collect::<IndexResult<_>>()
            .unwrap();
        assert_eq!(results.len(), 36);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(results[0].id, 11);
    }

    #[test]
    fn test_priority_search_can_stop_early() {
        let tree = grid_tree();
        let first: Vec<ObjectId> = tree
            .priority_search(&[0.0, 0.0])
            .unwrap()
            .take(3)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(first[0], 0);
        assert_eq!(first.len(), 3);
        assert_eq!(ids(&tree.knn_search(&[0.0, 0.0], 1).unwrap()), vec![0]);
    }

    #[test]
    fn test_query_by_id() {
        let points: VecRelation<Vec<f64>> = (0..36)
            .map(|i| vec![(i / 6) as f64, (i % 6) as f64])
            .collect();
        let tree = grid_tree();
        let results = tree.knn_search_by_id(&points, 0, 1).unwrap();
        assert_eq!(ids(&results), vec![0]);
        assert!(matches!(
            tree.knn_search_by_id(&points, 99, 1),
            Err(IndexError::ObjectNotFound(99))
        ));
    }

    #[test]
    fn test_other_metric() {
        let config = TreeConfig::builder().node_capacity(4).build().unwrap();
        let mut tree = RStarTree::in_memory(config, Manhattan).unwrap();
        tree.insert(1, &[0.0, 0.0]).unwrap();
        tree.insert(2, &[1.0, 1.0]).unwrap();
        tree.insert(3, &[2.0, 0.0]).unwrap();
        let results = tree.range_search(&[0.0, 0.0], 2.0).unwrap();
        assert_eq!(ids(&results), vec![1, 2, 3]);
        assert_eq!(results[1].distance, 2.0);
    }

    #[test]
    fn test_invalid_queries() {
        let tree = grid_tree();
        assert!(matches!(
            tree.knn_search(&[1.0], 1),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            tree.range_search(&[1.0, 1.0], -1.0),
            Err(IndexError::InvalidInput(_))
        ));
        assert!(matches!(
            tree.range_search(&[f64::NAN, 1.0], 1.0),
            Err(IndexError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_tree_queries() {
        let tree = RStarTree::in_memory(TreeConfig::default(), Euclidean).unwrap();
        assert!(tree.knn_search(&[1.0, 2.0], 3).unwrap().is_empty());
        assert!(tree.range_search(&[1.0, 2.0], 3.0).unwrap().is_empty());
        assert_eq!(tree.priority_search(&[1.0]).unwrap().count(), 0);
    }
}
