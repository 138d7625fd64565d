//! Handled-marking for density-linked clustering.
//!
//! A clustering walk repeatedly asks for the nearest object it has not yet
//! processed. Leaf entries carry a `handled` flag and every directory entry
//! summarizes its subtree in `has_handled` / `has_unhandled`, so the search
//! can skip subtrees that hold nothing but handled objects.

use log::debug;

use crate::distance::SpatialDistance;
use crate::errors::{IndexError, IndexResult};
use crate::rtree::entry::node_flags;
use crate::rtree::query::SpatialExpander;
use crate::rtree::tree::RStarTree;
use crate::search::PrioritySearch;
use crate::types::ObjectId;

impl<D: SpatialDistance> RStarTree<D> {
    /// Marks the object `id` at `point` as handled. Returns false if no
    /// such entry exists.
    pub fn mark_handled(&mut self, id: ObjectId, point: &[f64]) -> IndexResult<bool> {
        self.check_open()?;
        self.check_query(point)?;
        let Some(root) = self.root_page() else {
            return Ok(false);
        };
        let mut path = Vec::new();
        let Some(mut node) = self.find_leaf(root, id, point, &mut path)? else {
            return Ok(false);
        };
        let entry = node
            .leaf_entries_mut()?
            .iter_mut()
            .find(|e| e.id == id && e.point.as_slice() == point)
            .ok_or_else(|| IndexError::Corrupted(format!("object {} vanished from its leaf", id)))?;
        if entry.handled {
            return Ok(true);
        }
        entry.handled = true;

        let mut flags = node_flags(&node);
        self.page_file.write_page(node.page_id, node)?;
        while let Some((parent_id, index)) = path.pop() {
            let mut parent = self.read_node(parent_id)?;
            let entries = parent.directory_entries_mut()?;
            let Some(parent_entry) = entries.get_mut(index) else {
                return Err(IndexError::Corrupted(format!(
                    "page {} has no entry {}",
                    parent_id, index
                )));
            };
            if (parent_entry.has_handled, parent_entry.has_unhandled) == flags {
                break;
            }
            parent_entry.has_handled = flags.0;
            parent_entry.has_unhandled = flags.1;
            flags = node_flags(&parent);
            self.page_file.write_page(parent_id, parent)?;
        }
        debug!("Marked object {} as handled", id);
        Ok(true)
    }

    /// Like [`RStarTree::priority_search`], but yields only objects that are
    /// not marked as handled.
    pub fn unhandled_priority_search(
        &self,
        query: &[f64],
    ) -> IndexResult<PrioritySearch<SpatialExpander<'_, D>>> {
        self.check_open()?;
        self.check_query(query)?;
        PrioritySearch::new(SpatialExpander::new(self, query, true))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TreeConfig;
    use crate::distance::Euclidean;
    use crate::errors::IndexResult;
    use crate::rtree::RStarTree;
    use crate::types::DistanceResult;

    fn line_tree(n: u64) -> RStarTree {
        let config = TreeConfig::builder().node_capacity(3).build().unwrap();
        let mut tree = RStarTree::in_memory(config, Euclidean).unwrap();
        for i in 0..n {
            tree.insert(i, &[i as f64, 0.0]).unwrap();
        }
        tree
    }

    fn unhandled(tree: &RStarTree, query: &[f64]) -> Vec<u64> {
        let results: Vec<DistanceResult> = tree
            .unhandled_priority_search(query)
            .unwrap()
            .collect::<IndexResult<_>>()
            .unwrap();
        results.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_handled_objects_are_skipped() {
        let mut tree = line_tree(20);
        assert!(tree.mark_handled(0, &[0.0, 0.0]).unwrap());
        assert!(tree.mark_handled(1, &[1.0, 0.0]).unwrap());
        let order = unhandled(&tree, &[0.0, 0.0]);
        assert_eq!(order.len(), 18);
        assert_eq!(&order[..3], &[2, 3, 4]);
        // plain searches still see everything
        assert_eq!(tree.knn_search(&[0.0, 0.0], 1).unwrap()[0].id, 0);
    }

    #[test]
    fn test_marking_everything_empties_the_search() {
        let mut tree = line_tree(20);
        for i in 0..20u64 {
            assert!(tree.mark_handled(i, &[i as f64, 0.0]).unwrap());
        }
        assert!(unhandled(&tree, &[5.0, 0.0]).is_empty());
        let report = tree.check_integrity().unwrap();
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[test]
    fn test_mark_unknown_object() {
        let mut tree = line_tree(5);
        assert!(!tree.mark_handled(3, &[4.0, 0.0]).unwrap());
        assert!(!tree.mark_handled(42, &[1.0, 0.0]).unwrap());
        // marking twice is harmless
        assert!(tree.mark_handled(2, &[2.0, 0.0]).unwrap());
        assert!(tree.mark_handled(2, &[2.0, 0.0]).unwrap());
        assert_eq!(unhandled(&tree, &[2.0, 0.0]).len(), 4);
    }
}
