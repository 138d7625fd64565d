//! Entries of spatial tree nodes.

use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};
use crate::node::{Node, NodeEntries};
use crate::spatial::mbr::{Mbr, SpatialComparable};
use crate::types::{ObjectId, PageId};

/// A point object stored in a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialLeafEntry {
    pub id: ObjectId,
    pub point: Vec<f64>,
    /// Set once the object has been processed by a DeLiClu-style run.
    pub handled: bool,
}

impl SpatialLeafEntry {
    pub fn new(id: ObjectId, point: Vec<f64>) -> Self {
        Self {
            id,
            point,
            handled: false,
        }
    }
}

impl SpatialComparable for SpatialLeafEntry {
    fn dim(&self) -> usize {
        self.point.len()
    }

    fn min(&self, d: usize) -> f64 {
        self.point[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.point[d]
    }
}

/// The axes along which a directory entry's subtree has been split.
///
/// A fixed-size bitset: its encoded size only depends on the
/// dimensionality, which keeps the entry size predictable for the page
/// capacity computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitHistory(Vec<u64>);

impl SplitHistory {
    pub fn new(dims: usize) -> Self {
        SplitHistory(vec![0; dims.div_ceil(64)])
    }

    pub fn add(&mut self, axis: usize) {
        if let Some(word) = self.0.get_mut(axis / 64) {
            *word |= 1u64 << (axis % 64);
        }
    }

    pub fn contains(&self, axis: usize) -> bool {
        self.0
            .get(axis / 64)
            .map(|word| word & (1u64 << (axis % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Axes present in every history, ascending.
    pub fn common<'a, I>(histories: I, dims: usize) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a SplitHistory>,
    {
        let mut acc = vec![u64::MAX; dims.div_ceil(64)];
        let mut seen = false;
        for history in histories {
            seen = true;
            for (a, w) in acc.iter_mut().zip(&history.0) {
                *a &= *w;
            }
        }
        if !seen {
            return Vec::new();
        }
        (0..dims)
            .filter(|&axis| acc[axis / 64] & (1u64 << (axis % 64)) != 0)
            .collect()
    }
}

/// A pointer to a child node with the rectangle enclosing its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialDirectoryEntry {
    pub page_id: PageId,
    pub mbr: Mbr,
    pub split_history: SplitHistory,
    /// Some object below this entry is handled.
    pub has_handled: bool,
    /// Some object below this entry is not handled.
    pub has_unhandled: bool,
}

impl SpatialComparable for SpatialDirectoryEntry {
    fn dim(&self) -> usize {
        self.mbr.dim()
    }

    fn min(&self, d: usize) -> f64 {
        self.mbr.min[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.mbr.max[d]
    }

    fn to_mbr(&self) -> Mbr {
        self.mbr.clone()
    }
}

pub type SpatialNode = Node<SpatialLeafEntry, SpatialDirectoryEntry>;

/// Bounding rectangle of all entries of `node`; `None` for an empty node.
pub fn node_mbr(node: &SpatialNode) -> Option<Mbr> {
    match &node.entries {
        NodeEntries::Leaf(entries) => Mbr::union_all(entries.iter()),
        NodeEntries::Directory(entries) => Mbr::union_all(entries.iter()),
    }
}

/// `(has_handled, has_unhandled)` aggregated over the node's entries.
pub fn node_flags(node: &SpatialNode) -> (bool, bool) {
    match &node.entries {
        NodeEntries::Leaf(entries) => (
            entries.iter().any(|e| e.handled),
            entries.iter().any(|e| !e.handled),
        ),
        NodeEntries::Directory(entries) => (
            entries.iter().any(|e| e.has_handled),
            entries.iter().any(|e| e.has_unhandled),
        ),
    }
}

/// The parent entry describing `node`, keeping the given split history.
pub fn directory_entry_for(
    node: &SpatialNode,
    split_history: SplitHistory,
) -> IndexResult<SpatialDirectoryEntry> {
    let mbr = node_mbr(node).ok_or_else(|| {
        IndexError::Corrupted(format!("node on page {} has no entries", node.page_id))
    })?;
    let (has_handled, has_unhandled) = node_flags(node);
    Ok(SpatialDirectoryEntry {
        page_id: node.page_id,
        mbr,
        split_history,
        has_handled,
        has_unhandled,
    })
}

/// An entry waiting to be placed at some level of the tree, counted from
/// the leaves.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingEntry {
    Leaf(SpatialLeafEntry),
    Directory(SpatialDirectoryEntry),
}

impl PendingEntry {
    pub fn to_mbr(&self) -> Mbr {
        match self {
            PendingEntry::Leaf(e) => e.to_mbr(),
            PendingEntry::Directory(e) => e.mbr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_history_bits() {
        let mut h = SplitHistory::new(70);
        assert!(h.is_empty());
        h.add(3);
        h.add(65);
        assert!(h.contains(3));
        assert!(h.contains(65));
        assert!(!h.contains(4));
        assert!(!h.contains(500));
    }

    #[test]
    fn test_common_split_dimensions() {
        let mut a = SplitHistory::new(3);
        a.add(0);
        a.add(2);
        let mut b = SplitHistory::new(3);
        b.add(2);
        b.add(1);
        assert_eq!(SplitHistory::common([&a, &b], 3), vec![2]);
        assert!(SplitHistory::common(std::iter::empty(), 3).is_empty());
    }

    #[test]
    fn test_directory_entry_for_node() {
        let mut handled = SpatialLeafEntry::new(1, vec![0.0, 1.0]);
        handled.handled = true;
        let node = SpatialNode::new_leaf(
            7,
            4,
            vec![handled, SpatialLeafEntry::new(2, vec![2.0, -1.0])],
        );
        let entry = directory_entry_for(&node, SplitHistory::new(2)).unwrap();
        assert_eq!(entry.page_id, 7);
        assert_eq!(entry.mbr.min, vec![0.0, -1.0]);
        assert_eq!(entry.mbr.max, vec![2.0, 1.0]);
        assert!(entry.has_handled && entry.has_unhandled);

        let empty = SpatialNode::new_leaf(8, 4, vec![]);
        assert!(directory_entry_for(&empty, SplitHistory::new(2)).is_err());
    }
}
