//! The node model shared by all tree families.
//!
//! A node is the decoded content of one page. It is generic over the leaf
//! and directory entry types so that spatial and metric trees share the
//! page file, the split validation and the integrity checks.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};
use crate::page::constants::SMALL_CAPACITY_WARNING;
use crate::types::PageId;

/// Entries of a node: either all leaf entries or all directory entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeEntries<L, D> {
    Leaf(Vec<L>),
    Directory(Vec<D>),
}

/// A tree node as stored in one page (plus continuation pages for
/// supernodes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<L, D> {
    pub page_id: PageId,
    /// Maximum number of entries; larger than the tree's directory capacity
    /// only for supernodes.
    pub capacity: usize,
    pub entries: NodeEntries<L, D>,
}

impl<L, D> Node<L, D> {
    pub fn new_leaf(page_id: PageId, capacity: usize, entries: Vec<L>) -> Self {
        Self {
            page_id,
            capacity,
            entries: NodeEntries::Leaf(entries),
        }
    }

    pub fn new_directory(page_id: PageId, capacity: usize, entries: Vec<D>) -> Self {
        Self {
            page_id,
            capacity,
            entries: NodeEntries::Directory(entries),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.entries, NodeEntries::Leaf(_))
    }

    pub fn len(&self) -> usize {
        match &self.entries {
            NodeEntries::Leaf(entries) => entries.len(),
            NodeEntries::Directory(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_overflowing(&self) -> bool {
        self.len() > self.capacity
    }

    pub fn leaf_entries(&self) -> IndexResult<&Vec<L>> {
        match &self.entries {
            NodeEntries::Leaf(entries) => Ok(entries),
            NodeEntries::Directory(_) => Err(self.kind_mismatch("leaf")),
        }
    }

    pub fn leaf_entries_mut(&mut self) -> IndexResult<&mut Vec<L>> {
        match &mut self.entries {
            NodeEntries::Leaf(entries) => Ok(entries),
            NodeEntries::Directory(_) => Err(IndexError::Corrupted(format!(
                "expected leaf node on page {}",
                self.page_id
            ))),
        }
    }

    pub fn directory_entries(&self) -> IndexResult<&Vec<D>> {
        match &self.entries {
            NodeEntries::Directory(entries) => Ok(entries),
            NodeEntries::Leaf(_) => Err(self.kind_mismatch("directory")),
        }
    }

    pub fn directory_entries_mut(&mut self) -> IndexResult<&mut Vec<D>> {
        match &mut self.entries {
            NodeEntries::Directory(entries) => Ok(entries),
            NodeEntries::Leaf(_) => Err(IndexError::Corrupted(format!(
                "expected directory node on page {}",
                self.page_id
            ))),
        }
    }

    fn kind_mismatch(&self, expected: &str) -> IndexError {
        IndexError::Corrupted(format!(
            "expected {} node on page {}",
            expected, self.page_id
        ))
    }
}

/// Length of `value` in the page encoding.
pub fn encoded_len<T: Serialize + ?Sized>(value: &T) -> IndexResult<usize> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::legacy())?.len())
}

/// Node capacities and minimum fills of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacities {
    pub leaf_capacity: usize,
    pub directory_capacity: usize,
    pub leaf_minimum: usize,
    pub directory_minimum: usize,
}

impl Capacities {
    /// Capacities from explicit maxima.
    pub fn new(
        leaf_capacity: usize,
        directory_capacity: usize,
        min_fill: f64,
    ) -> IndexResult<Self> {
        for (what, cap) in [("leaf", leaf_capacity), ("directory", directory_capacity)] {
            if cap < 3 {
                return Err(IndexError::InvalidConfig(format!(
                    "{} capacity {} is too small (minimum 3)",
                    what, cap
                )));
            }
            if cap < SMALL_CAPACITY_WARNING {
                warn!(
                    "Page size is chosen very small! Maximum number of entries in a {} node = {}",
                    what, cap
                );
            }
        }
        Ok(Self {
            leaf_capacity,
            directory_capacity,
            leaf_minimum: minimum_fill(leaf_capacity, min_fill),
            directory_minimum: minimum_fill(directory_capacity, min_fill),
        })
    }

    /// Capacities that make a full node fit into one page payload.
    ///
    /// `empty_leaf` and `empty_directory` are nodes without entries; the
    /// samples are entries of the size every entry will have.
    pub fn from_page<L, D>(
        payload_capacity: usize,
        empty_leaf: &Node<L, D>,
        sample_leaf: &L,
        empty_directory: &Node<L, D>,
        sample_directory: &D,
        min_fill: f64,
    ) -> IndexResult<Self>
    where
        L: Serialize,
        D: Serialize,
    {
        let fit = |overhead: usize, entry: usize| -> usize {
            payload_capacity.saturating_sub(overhead) / entry.max(1)
        };
        let leaf_capacity = fit(encoded_len(empty_leaf)?, encoded_len(sample_leaf)?);
        let directory_capacity = fit(
            encoded_len(empty_directory)?,
            encoded_len(sample_directory)?,
        );
        Self::new(leaf_capacity, directory_capacity, min_fill).map_err(|e| match e {
            IndexError::InvalidConfig(msg) => IndexError::InvalidConfig(format!(
                "node size of {} bytes is chosen too small: {}",
                payload_capacity, msg
            )),
            other => other,
        })
    }

    pub fn capacity(&self, leaf: bool) -> usize {
        if leaf {
            self.leaf_capacity
        } else {
            self.directory_capacity
        }
    }

    pub fn minimum(&self, leaf: bool) -> usize {
        if leaf {
            self.leaf_minimum
        } else {
            self.directory_minimum
        }
    }
}

/// `max(1, floor(capacity * min_fill))`
pub fn minimum_fill(capacity: usize, min_fill: f64) -> usize {
    ((capacity as f64 * min_fill).floor() as usize).max(1)
}
