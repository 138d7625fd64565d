//! The paged R*-tree and X-tree.
//!
//! Nodes live in a [`PageFile`] and reference each other by page id. Parent
//! links are never stored: every descent records its path as a list of
//! `(page_id, child_index)` steps which the upward passes (adjust, condense)
//! walk back.
//!
//! Levels are counted from the leaves, which are level 0; the root sits at
//! level `height - 1`.

use std::path::Path;

use log::{debug, info};

use crate::config::{TreeConfig, TreeVariant};
use crate::distance::{Euclidean, SpatialDistance};
use crate::errors::{IndexError, IndexResult};
use crate::node::{Capacities, Node, NodeEntries};
use crate::page::{FilePageStore, MemoryPageStore, PageFile, PageStore, TreeHeader};
use crate::rtree::entry::{
    directory_entry_for, node_mbr, PendingEntry, SpatialDirectoryEntry, SpatialLeafEntry,
    SpatialNode, SplitHistory,
};
use crate::rtree::overflow::{select_reinsert, InsertState, OverflowTreatment, ReinsertStrategy};
use crate::rtree::split::{materialize, SplitResult, SplitStrategy};
use crate::rtree::xsplit::{XSplit, XSplitter};
use crate::spatial::mbr::{self, Mbr};
use crate::types::{IndexKind, ObjectId, PageId, TreeStats};

/// One step of a root-to-node path: a directory page and the index of the
/// entry that was followed.
pub(crate) type PathStep = (PageId, usize);

/// Result of splitting an overflowing node.
enum SplitOutcome {
    Split {
        left: SpatialNode,
        right: SpatialNode,
        axis: Option<usize>,
    },
    /// The node was kept whole with a larger capacity.
    Supernode(SpatialNode),
}

/// A paged R*-tree over points, optionally running the X-tree split policy.
///
/// # Example
///
/// ```rust
/// use pagetree::config::TreeConfig;
/// use pagetree::distance::Euclidean;
/// use pagetree::rtree::RStarTree;
///
/// let config = TreeConfig::builder().node_capacity(4).build().unwrap();
/// let mut tree = RStarTree::in_memory(config, Euclidean).unwrap();
/// tree.insert(1, &[0.0, 0.0]).unwrap();
/// tree.insert(2, &[3.0, 4.0]).unwrap();
///
/// let nearest = tree.knn_search(&[0.5, 0.0], 1).unwrap();
/// assert_eq!(nearest[0].id, 1);
/// ```
pub struct RStarTree<D: SpatialDistance = Euclidean> {
    pub(crate) page_file: PageFile<SpatialNode>,
    pub(crate) distance: D,
    pub(crate) config: TreeConfig,
    pub(crate) header: TreeHeader,
    pub(crate) capacities: Option<Capacities>,
}

fn kind_of(variant: &TreeVariant) -> IndexKind {
    match variant {
        TreeVariant::RStar => IndexKind::RStar,
        TreeVariant::XTree { .. } => IndexKind::XTree,
    }
}

impl<D: SpatialDistance> RStarTree<D> {
    /// Creates an empty tree whose pages stay in memory.
    pub fn in_memory(config: TreeConfig, distance: D) -> IndexResult<Self> {
        let store = MemoryPageStore::new(config.page.page_size)?;
        Self::create_with_store(Box::new(store), config, distance)
    }

    /// Creates an empty tree in a new page file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, config: TreeConfig, distance: D) -> IndexResult<Self> {
        config.validate()?;
        let store = FilePageStore::create(
            path.as_ref(),
            config.page.page_size,
            config.page.reserved_pages,
        )?;
        Self::create_with_store(Box::new(store), config, distance)
    }

    /// Opens the tree stored at `path`. The page size and capacities come
    /// from the file; the strategies from `config`.
    pub fn open<P: AsRef<Path>>(path: P, config: TreeConfig, distance: D) -> IndexResult<Self> {
        let store = FilePageStore::open(path.as_ref())?;
        Self::open_with_store(Box::new(store), config, distance)
    }

    pub fn create_with_store(
        store: Box<dyn PageStore>,
        config: TreeConfig,
        distance: D,
    ) -> IndexResult<Self> {
        config.validate()?;
        let page_file = PageFile::create(store, config.page.cache_pages)?;
        let header = TreeHeader::empty(kind_of(&config.variant));
        let tree = Self {
            page_file,
            distance,
            config,
            header,
            capacities: None,
        };
        tree.persist_header()?;
        info!(
            "Created {:?} tree (page size {})",
            tree.header.kind,
            tree.page_file.page_size()
        );
        Ok(tree)
    }

    pub fn open_with_store(
        store: Box<dyn PageStore>,
        config: TreeConfig,
        distance: D,
    ) -> IndexResult<Self> {
        config.validate()?;
        let page_file = PageFile::open(store, config.page.cache_pages)?;
        let header: TreeHeader = page_file
            .tree_header()?
            .ok_or_else(|| IndexError::Corrupted("page file holds no tree header".into()))?;
        let expected = kind_of(&config.variant);
        if header.kind != expected {
            return Err(IndexError::InvalidConfig(format!(
                "page file holds a {:?} tree, configured for {:?}",
                header.kind, expected
            )));
        }
        let capacities = (header.leaf_capacity > 0).then_some(Capacities {
            leaf_capacity: header.leaf_capacity,
            directory_capacity: header.directory_capacity,
            leaf_minimum: header.leaf_minimum,
            directory_minimum: header.directory_minimum,
        });
        info!(
            "Opened {:?} tree: {} entries, height {}",
            header.kind, header.entry_count, header.height
        );
        Ok(Self {
            page_file,
            distance,
            config,
            header,
            capacities,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Number of indexed objects.
    pub fn size(&self) -> u64 {
        self.header.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.root.is_none()
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> usize {
        self.header.height
    }

    /// Dimensionality fixed by the first insert; 0 before that.
    pub fn dimensionality(&self) -> usize {
        self.header.dimensionality
    }

    pub fn capacities(&self) -> Option<Capacities> {
        self.capacities
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn distance_function(&self) -> &D {
        &self.distance
    }

    pub(crate) fn root_page(&self) -> Option<PageId> {
        self.header.root
    }

    pub fn stats(&self) -> TreeStats {
        let page_stats = self.page_file.stats();
        TreeStats {
            total_entries: self.header.entry_count,
            tree_height: self.header.height,
            leaf_capacity: self.header.leaf_capacity,
            directory_capacity: self.header.directory_capacity,
            cached_pages: page_stats.cached_pages,
            cache_hits: page_stats.cache_hits,
            cache_misses: page_stats.cache_misses,
            page_reads: page_stats.page_reads,
            page_writes: page_stats.page_writes,
            allocated_pages: page_stats.allocated_pages,
            free_pages: page_stats.free_pages,
        }
    }

    /// Writes all dirty pages and the tree header.
    pub fn flush(&self) -> IndexResult<()> {
        self.persist_header()?;
        self.page_file.flush()
    }

    /// Flushes and closes the page file. Later operations fail with
    /// `Closed`.
    pub fn close(&self) -> IndexResult<()> {
        if self.page_file.is_closed() {
            return Ok(());
        }
        self.persist_header()?;
        self.page_file.close()?;
        info!("Closed {:?} tree", self.header.kind);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals shared with the query and check modules
    // ------------------------------------------------------------------

    pub(crate) fn check_open(&self) -> IndexResult<()> {
        if self.page_file.is_closed() {
            return Err(IndexError::Closed);
        }
        Ok(())
    }

    pub(crate) fn read_node(&self, page_id: PageId) -> IndexResult<SpatialNode> {
        self.page_file.read_page(page_id)
    }

    fn write_node(&self, node: SpatialNode) -> IndexResult<()> {
        self.page_file.write_page(node.page_id, node)
    }

    fn persist_header(&self) -> IndexResult<()> {
        self.page_file.set_tree_header(&self.header)
    }

    pub(crate) fn require_capacities(&self) -> IndexResult<Capacities> {
        self.capacities.ok_or_else(|| {
            IndexError::InvalidOperation("tree capacities are not initialized yet".into())
        })
    }

    /// X-tree split parameters, `None` for an R*-tree.
    pub(crate) fn xsplitter(&self) -> IndexResult<Option<XSplitter>> {
        match self.config.variant {
            TreeVariant::RStar => Ok(None),
            TreeVariant::XTree {
                max_overlap,
                min_fanout,
            } => {
                let caps = self.require_capacities()?;
                Ok(Some(XSplitter::new(
                    max_overlap,
                    min_fanout,
                    caps.directory_capacity,
                    caps.directory_minimum,
                )))
            }
        }
    }

    /// Smallest entry count allowed in a non-root node.
    pub(crate) fn minimum_entries(&self, leaf: bool) -> IndexResult<usize> {
        let caps = self.require_capacities()?;
        if leaf {
            return Ok(caps.leaf_minimum);
        }
        Ok(match self.xsplitter()? {
            Some(splitter) => splitter.lower_bound(),
            None => caps.directory_minimum,
        })
    }

    /// Checks a point against the tree's dimensionality, fixing it (and
    /// the node capacities) on first use.
    pub(crate) fn check_point(&mut self, point: &[f64]) -> IndexResult<()> {
        if point.is_empty() {
            return Err(IndexError::InvalidInput("point has no coordinates".into()));
        }
        if point.iter().any(|c| !c.is_finite()) {
            return Err(IndexError::InvalidInput(format!(
                "point {:?} has non-finite coordinates",
                point
            )));
        }
        if self.header.dimensionality == 0 {
            self.init_capacities(point.len())?;
        } else if point.len() != self.header.dimensionality {
            return Err(IndexError::DimensionMismatch {
                expected: self.header.dimensionality,
                actual: point.len(),
            });
        }
        Ok(())
    }

    /// Checks a query point without fixing anything.
    pub(crate) fn check_query(&self, query: &[f64]) -> IndexResult<()> {
        if query.iter().any(|c| !c.is_finite()) {
            return Err(IndexError::InvalidInput(format!(
                "query {:?} has non-finite coordinates",
                query
            )));
        }
        let dims = self.header.dimensionality;
        if dims != 0 && query.len() != dims {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: query.len(),
            });
        }
        Ok(())
    }

    fn init_capacities(&mut self, dims: usize) -> IndexResult<()> {
        let page = &self.config.page;
        let caps = match (page.leaf_capacity, page.directory_capacity) {
            (Some(leaf), Some(dir)) => Capacities::new(leaf, dir, page.min_fill_factor)?,
            (leaf, dir) => {
                let origin = vec![0.0; dims];
                let sample_directory = SpatialDirectoryEntry {
                    page_id: 0,
                    mbr: Mbr::from_point(&origin),
                    split_history: SplitHistory::new(dims),
                    has_handled: false,
                    has_unhandled: false,
                };
                let fit = Capacities::from_page(
                    self.page_file.payload_capacity(),
                    &SpatialNode::new_leaf(0, 0, Vec::new()),
                    &SpatialLeafEntry::new(0, origin.clone()),
                    &SpatialNode::new_directory(0, 0, Vec::new()),
                    &sample_directory,
                    page.min_fill_factor,
                )?;
                Capacities::new(
                    leaf.unwrap_or(fit.leaf_capacity),
                    dir.unwrap_or(fit.directory_capacity),
                    page.min_fill_factor,
                )?
            }
        };
        self.header.dimensionality = dims;
        self.header.leaf_capacity = caps.leaf_capacity;
        self.header.directory_capacity = caps.directory_capacity;
        self.header.leaf_minimum = caps.leaf_minimum;
        self.header.directory_minimum = caps.directory_minimum;
        self.capacities = Some(caps);
        debug!(
            "{}-dimensional tree: leaf capacity {}, directory capacity {}",
            dims, caps.leaf_capacity, caps.directory_capacity
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Inserts a point object.
    pub fn insert(&mut self, id: ObjectId, point: &[f64]) -> IndexResult<()> {
        self.check_open()?;
        self.check_point(point)?;
        self.insert_leaf_entry(SpatialLeafEntry::new(id, point.to_vec()))?;
        self.header.entry_count += 1;
        self.persist_header()
    }

    /// Places a leaf entry as one top-level insertion.
    fn insert_leaf_entry(&mut self, entry: SpatialLeafEntry) -> IndexResult<()> {
        if self.header.root.is_none() {
            let caps = self.require_capacities()?;
            let page_id = self.page_file.allocate_page()?;
            self.write_node(Node::new_leaf(page_id, caps.leaf_capacity, vec![entry]))?;
            self.header.root = Some(page_id);
            self.header.height = 1;
            return Ok(());
        }
        let mut state = InsertState::new();
        self.insert_at_level(PendingEntry::Leaf(entry), 0, &mut state)
    }

    /// Inserts `entry` into a node at `level`, then adjusts the tree.
    fn insert_at_level(
        &mut self,
        entry: PendingEntry,
        level: usize,
        state: &mut InsertState,
    ) -> IndexResult<()> {
        let (path, target) = self.choose_path(&entry.to_mbr(), level)?;
        let mut node = self.read_node(target)?;
        match (entry, &mut node.entries) {
            (PendingEntry::Leaf(e), NodeEntries::Leaf(entries)) => entries.push(e),
            (PendingEntry::Directory(e), NodeEntries::Directory(entries)) => entries.push(e),
            _ => {
                return Err(IndexError::Corrupted(format!(
                    "node on page {} has the wrong kind for level {}",
                    target, level
                )))
            }
        }
        self.adjust_tree(path, node, level, state)
    }

    /// Descends from the root to the node at `target_level` best suited
    /// for `mbr`.
    fn choose_path(&self, mbr: &Mbr, target_level: usize) -> IndexResult<(Vec<PathStep>, PageId)> {
        let mut page_id = self
            .header
            .root
            .ok_or_else(|| IndexError::InvalidOperation("tree has no root".into()))?;
        let root_level = self.header.height.saturating_sub(1);
        if target_level > root_level {
            return Err(IndexError::InvalidOperation(format!(
                "level {} above the root level {}",
                target_level, root_level
            )));
        }
        let mut path = Vec::with_capacity(root_level - target_level);
        let mut level = root_level;
        while level > target_level {
            let node = self.read_node(page_id)?;
            let children = node.directory_entries()?;
            if children.is_empty() {
                return Err(IndexError::Corrupted(format!(
                    "directory node on page {} has no entries",
                    page_id
                )));
            }
            let index = self
                .config
                .insertion_strategy
                .choose(children, mbr, level == 1);
            path.push((page_id, index));
            page_id = children[index].page_id;
            level -= 1;
        }
        Ok((path, page_id))
    }

    /// Writes `node` and walks up `path`, treating overflows and updating
    /// the parent entries until nothing changes any more.
    fn adjust_tree(
        &mut self,
        mut path: Vec<PathStep>,
        mut node: SpatialNode,
        mut level: usize,
        state: &mut InsertState,
    ) -> IndexResult<()> {
        loop {
            let is_root = path.is_empty();
            let mut sibling = None;

            if node.is_overflowing() {
                let caps = self.require_capacities()?;
                let supernode = !node.is_leaf() && node.capacity > caps.directory_capacity;
                if supernode {
                    node.capacity += caps.directory_capacity;
                    debug!(
                        "Supernode on page {} grows to capacity {}",
                        node.page_id, node.capacity
                    );
                } else if let (OverflowTreatment::Reinsert { strategy, fraction }, true) = (
                    self.config.overflow_treatment,
                    state.may_reinsert(level, is_root),
                ) {
                    return self.reinsert(path, node, level, strategy, fraction, state);
                } else {
                    match self.split_node(node)? {
                        SplitOutcome::Split { left, right, axis } => {
                            node = left;
                            sibling = Some((right, axis));
                        }
                        SplitOutcome::Supernode(grown) => node = grown,
                    }
                }
            }

            if let Some((right, axis)) = sibling {
                let parent = path.pop();
                let mut history = match parent {
                    Some((parent_id, index)) => {
                        let parent_node = self.read_node(parent_id)?;
                        entry_at(&parent_node, index)?.split_history.clone()
                    }
                    None => SplitHistory::new(self.header.dimensionality),
                };
                if let Some(axis) = axis {
                    history.add(axis);
                }
                let left_entry = directory_entry_for(&node, history.clone())?;
                let right_entry = directory_entry_for(&right, history)?;
                debug!(
                    "Split page {} at level {}: {} + {} entries on new page {}",
                    node.page_id,
                    level,
                    node.len(),
                    right.len(),
                    right.page_id
                );
                self.write_node(node)?;
                self.write_node(right)?;

                let Some((parent_id, index)) = parent else {
                    self.grow_root(left_entry, right_entry)?;
                    return Ok(());
                };
                let mut parent_node = self.read_node(parent_id)?;
                let entries = parent_node.directory_entries_mut()?;
                if index >= entries.len() {
                    return Err(stale_path(parent_id, index));
                }
                entries[index] = left_entry;
                entries.push(right_entry);
                node = parent_node;
                level += 1;
                continue;
            }

            let Some((parent_id, index)) = path.pop() else {
                return self.write_node(node);
            };
            let mut parent_node = self.read_node(parent_id)?;
            let entries = parent_node.directory_entries_mut()?;
            let current = entries
                .get(index)
                .ok_or_else(|| stale_path(parent_id, index))?;
            let updated = directory_entry_for(&node, current.split_history.clone())?;
            let unchanged = *current == updated;
            self.write_node(node)?;
            if unchanged {
                return Ok(());
            }
            entries[index] = updated;
            node = parent_node;
            level += 1;
        }
    }

    /// Replaces the root by a new directory over the two halves of the old
    /// root.
    fn grow_root(
        &mut self,
        left: SpatialDirectoryEntry,
        right: SpatialDirectoryEntry,
    ) -> IndexResult<()> {
        let caps = self.require_capacities()?;
        let root_id = self.page_file.allocate_page()?;
        self.write_node(Node::new_directory(
            root_id,
            caps.directory_capacity,
            vec![left, right],
        ))?;
        self.header.root = Some(root_id);
        self.header.height += 1;
        debug!(
            "Root split: new root on page {}, height now {}",
            root_id, self.header.height
        );
        Ok(())
    }

    /// Removes part of an overflowing node's entries and inserts them again
    /// from the root.
    fn reinsert(
        &mut self,
        path: Vec<PathStep>,
        mut node: SpatialNode,
        level: usize,
        strategy: ReinsertStrategy,
        fraction: f64,
        state: &mut InsertState,
    ) -> IndexResult<()> {
        state.mark_treated(level);
        let min_keep = self.minimum_entries(node.is_leaf())?;
        let bounds = node_mbr(&node)
            .ok_or_else(|| IndexError::Corrupted(format!("page {} is empty", node.page_id)))?;
        let entries = std::mem::replace(&mut node.entries, NodeEntries::Leaf(Vec::new()));
        let removed: Vec<PendingEntry> = match entries {
            NodeEntries::Leaf(entries) => {
                let (keep, removed) = select_reinsert(entries, &bounds, strategy, fraction, min_keep);
                node.entries = NodeEntries::Leaf(keep);
                removed.into_iter().map(PendingEntry::Leaf).collect()
            }
            NodeEntries::Directory(entries) => {
                let (keep, removed) = select_reinsert(entries, &bounds, strategy, fraction, min_keep);
                node.entries = NodeEntries::Directory(keep);
                removed.into_iter().map(PendingEntry::Directory).collect()
            }
        };
        debug!(
            "Reinserting {} entries of page {} at level {}",
            removed.len(),
            node.page_id,
            level
        );

        // shrink the ancestors first: the removed entries are placed from
        // the root and must not see the stale rectangles
        self.adjust_tree(path, node, level, state)?;

        let was_reinserting = state.is_reinserting();
        state.set_reinserting(true);
        let mut result = Ok(());
        for entry in removed {
            result = self.insert_at_level(entry, level, state);
            if result.is_err() {
                break;
            }
        }
        state.set_reinserting(was_reinserting);
        result
    }

    fn split_node(&mut self, node: SpatialNode) -> IndexResult<SplitOutcome> {
        let caps = self.require_capacities()?;
        let xsplitter = self.xsplitter()?;
        let page_id = node.page_id;
        let capacity = node.capacity;
        match node.entries {
            NodeEntries::Leaf(entries) => {
                let strategy = match xsplitter {
                    Some(_) => SplitStrategy::Topological,
                    None => self.config.split_strategy,
                };
                let result = strategy.split(entries, caps.leaf_minimum)?;
                self.split_pair(result, page_id, |id, entries| {
                    Node::new_leaf(id, caps.leaf_capacity, entries)
                })
            }
            NodeEntries::Directory(entries) => {
                let result = match xsplitter {
                    None => self
                        .config
                        .split_strategy
                        .split(entries, caps.directory_minimum)?,
                    Some(splitter) => match splitter.split(&entries) {
                        XSplit::Split(partition) => {
                            materialize(entries, partition, splitter.lower_bound())?
                        }
                        XSplit::Supernode => {
                            let grown = capacity + caps.directory_capacity;
                            debug!(
                                "No acceptable split for page {}, supernode of capacity {}",
                                page_id, grown
                            );
                            return Ok(SplitOutcome::Supernode(Node::new_directory(
                                page_id, grown, entries,
                            )));
                        }
                    },
                };
                self.split_pair(result, page_id, |id, entries| {
                    Node::new_directory(id, caps.directory_capacity, entries)
                })
            }
        }
    }

    /// Builds the two halves of a split; the left half keeps the page.
    fn split_pair<E, F>(
        &self,
        result: SplitResult<E>,
        page_id: PageId,
        make: F,
    ) -> IndexResult<SplitOutcome>
    where
        F: Fn(PageId, Vec<E>) -> SpatialNode,
    {
        let right_id = self.page_file.allocate_page()?;
        Ok(SplitOutcome::Split {
            left: make(page_id, result.left),
            right: make(right_id, result.right),
            axis: result.axis,
        })
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Removes the object `id` stored at `point`. Returns false if no such
    /// entry exists.
    pub fn delete(&mut self, id: ObjectId, point: &[f64]) -> IndexResult<bool> {
        self.check_open()?;
        self.check_query(point)?;
        let Some(root) = self.header.root else {
            return Ok(false);
        };
        let mut path = Vec::new();
        let Some(mut leaf) = self.find_leaf(root, id, point, &mut path)? else {
            return Ok(false);
        };
        // a repeated (id, point) pair stays indexed once per insert
        let entries = leaf.leaf_entries_mut()?;
        if let Some(position) = entries
            .iter()
            .position(|e| e.id == id && e.point.as_slice() == point)
        {
            entries.remove(position);
        }

        let orphans = self.condense_tree(path, leaf)?;
        if !orphans.is_empty() {
            debug!("Reinserting {} orphaned entries", orphans.len());
        }
        for entry in orphans {
            self.insert_leaf_entry(entry)?;
        }
        self.header.entry_count = self.header.entry_count.saturating_sub(1);
        self.persist_header()?;
        Ok(true)
    }

    /// Finds the leaf holding `(id, point)`, recording the path to it.
    pub(crate) fn find_leaf(
        &self,
        page_id: PageId,
        id: ObjectId,
        point: &[f64],
        path: &mut Vec<PathStep>,
    ) -> IndexResult<Option<SpatialNode>> {
        let node = self.read_node(page_id)?;
        match &node.entries {
            NodeEntries::Leaf(entries) => {
                let found = entries
                    .iter()
                    .any(|e| e.id == id && e.point.as_slice() == point);
                Ok(found.then_some(node))
            }
            NodeEntries::Directory(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    if !mbr::contains(&entry.mbr, point) {
                        continue;
                    }
                    path.push((page_id, index));
                    if let Some(leaf) = self.find_leaf(entry.page_id, id, point, path)? {
                        return Ok(Some(leaf));
                    }
                    path.pop();
                }
                Ok(None)
            }
        }
    }

    /// Walks up from a node that lost entries, dissolving underfull nodes.
    /// Returns the leaf entries of dissolved subtrees.
    fn condense_tree(
        &mut self,
        mut path: Vec<PathStep>,
        mut node: SpatialNode,
    ) -> IndexResult<Vec<SpatialLeafEntry>> {
        let caps = self.require_capacities()?;
        let mut orphans = Vec::new();
        loop {
            if !node.is_leaf()
                && node.capacity > caps.directory_capacity
                && node.len() <= caps.directory_capacity
            {
                node.capacity = caps.directory_capacity;
            }
            let Some((parent_id, index)) = path.pop() else {
                self.settle_root(node)?;
                return Ok(orphans);
            };
            let mut parent = self.read_node(parent_id)?;
            let entries = parent.directory_entries_mut()?;
            if index >= entries.len() {
                return Err(stale_path(parent_id, index));
            }
            if node.len() < self.minimum_entries(node.is_leaf())? {
                entries.remove(index);
                self.dissolve(node, &mut orphans)?;
            } else {
                let history = entries[index].split_history.clone();
                entries[index] = directory_entry_for(&node, history)?;
                self.write_node(node)?;
            }
            node = parent;
        }
    }

    /// Frees the pages of `node`'s subtree, collecting its leaf entries.
    fn dissolve(&self, node: SpatialNode, orphans: &mut Vec<SpatialLeafEntry>) -> IndexResult<()> {
        let page_id = node.page_id;
        match node.entries {
            NodeEntries::Leaf(entries) => orphans.extend(entries),
            NodeEntries::Directory(entries) => {
                for entry in entries {
                    let child = self.read_node(entry.page_id)?;
                    self.dissolve(child, orphans)?;
                }
            }
        }
        self.page_file.free_page(page_id)
    }

    /// Stores the root after a deletion, shortening the tree while the
    /// root is a directory with a single child.
    fn settle_root(&mut self, mut root: SpatialNode) -> IndexResult<()> {
        loop {
            if root.is_empty() {
                self.page_file.free_page(root.page_id)?;
                self.header.root = None;
                self.header.height = 0;
                return Ok(());
            }
            if root.is_leaf() || root.len() > 1 {
                self.header.root = Some(root.page_id);
                return self.write_node(root);
            }
            let child_id = root.directory_entries()?[0].page_id;
            self.page_file.free_page(root.page_id)?;
            self.header.height -= 1;
            debug!("Root shrinks to page {}, height now {}", child_id, self.header.height);
            root = self.read_node(child_id)?;
        }
    }

    // ------------------------------------------------------------------
    // Bulk loading
    // ------------------------------------------------------------------

    /// Builds the tree bottom-up from `items`. The tree must be empty.
    pub fn bulk_load(&mut self, items: Vec<(ObjectId, Vec<f64>)>) -> IndexResult<()> {
        self.check_open()?;
        if self.header.root.is_some() {
            return Err(IndexError::InvalidOperation(
                "bulk load requires an empty tree".into(),
            ));
        }
        if items.is_empty() {
            info!("Bulk load of an empty set leaves the tree empty");
            return Ok(());
        }
        for (_, point) in &items {
            self.check_point(point)?;
        }
        let caps = self.require_capacities()?;
        let dims = self.header.dimensionality;
        let count = items.len() as u64;
        let split = self.config.bulk_split;

        let leaves: Vec<SpatialLeafEntry> = items
            .into_iter()
            .map(|(id, point)| SpatialLeafEntry::new(id, point))
            .collect();
        let mut level: Vec<SpatialDirectoryEntry> = Vec::new();
        for group in split.partition(leaves, caps.leaf_minimum, caps.leaf_capacity)? {
            let page_id = self.page_file.allocate_page()?;
            let node = Node::new_leaf(page_id, caps.leaf_capacity, group);
            level.push(directory_entry_for(&node, SplitHistory::new(dims))?);
            self.write_node(node)?;
        }

        let mut height = 1;
        while level.len() > 1 {
            let mut next = Vec::new();
            for group in split.partition(level, caps.directory_minimum, caps.directory_capacity)? {
                let page_id = self.page_file.allocate_page()?;
                let node = Node::new_directory(page_id, caps.directory_capacity, group);
                next.push(directory_entry_for(&node, SplitHistory::new(dims))?);
                self.write_node(node)?;
            }
            level = next;
            height += 1;
        }

        self.header.root = level.first().map(|e| e.page_id);
        self.header.height = height;
        self.header.entry_count = count;
        self.persist_header()?;
        info!(
            "Bulk loaded {} objects with {:?}: height {}",
            count, split, height
        );
        Ok(())
    }
}

fn entry_at(node: &SpatialNode, index: usize) -> IndexResult<&SpatialDirectoryEntry> {
    node.directory_entries()?
        .get(index)
        .ok_or_else(|| stale_path(node.page_id, index))
}

fn stale_path(page_id: PageId, index: usize) -> IndexError {
    IndexError::Corrupted(format!("page {} has no entry {}", page_id, index))
}
