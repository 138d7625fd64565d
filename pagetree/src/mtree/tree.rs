//! The paged M-tree.
//!
//! Objects live in the relation; the tree stores ids, covering radii and
//! the distance of every entry to the routing object of its node. Like the
//! spatial trees, descents record `(page_id, child_index)` paths instead of
//! parent links.
//!
//! The routing object of a directory entry is always one of the objects the
//! entries of its child are centered on, so every object the tree refers to
//! is indexed below the reference. Deleting an object therefore only has to
//! repair the entries on the path to its leaf.

use std::path::Path;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::MTreeConfig;
use crate::distance::DistanceFunction;
use crate::errors::{IndexError, IndexResult};
use crate::mtree::entry::{
    covering_radius, entry_objects, knn_aggregate, MetricDirectoryEntry, MetricEntry,
    MetricLeafEntry, MetricNode,
};
use crate::mtree::split::{self, MetricGroup};
use crate::node::{Capacities, Node, NodeEntries};
use crate::page::{FilePageStore, MemoryPageStore, PageFile, PageStore, TreeHeader};
use crate::relation::Relation;
use crate::types::{IndexKind, ObjectId, PageId, TreeStats};

pub(crate) type PathStep = (PageId, usize);

/// Relative slack applied when a covering radius is compared with a
/// distance, absorbing rounding in the triangle inequality.
pub(crate) const RADIUS_TOLERANCE: f64 = 1e-12;

/// True if an object at `distance` from a routing object may lie inside its
/// ball of `radius`.
pub(crate) fn within_radius(distance: f64, radius: f64) -> bool {
    distance <= radius + RADIUS_TOLERANCE * (distance + radius)
}

/// A paged M-tree over the objects of a relation.
///
/// # Example
///
/// ```rust
/// use pagetree::config::MTreeConfig;
/// use pagetree::distance::Levenshtein;
/// use pagetree::mtree::MTree;
/// use pagetree::relation::VecRelation;
///
/// let words: VecRelation<String> = ["kitten", "sitting", "mitten", "fitting"]
///     .iter()
///     .map(|w| w.to_string())
///     .collect();
/// let config = MTreeConfig::builder().node_capacity(4).build().unwrap();
/// let mut tree = MTree::in_memory(config, words, Levenshtein).unwrap();
/// tree.bulk_load(vec![0, 1, 2, 3]).unwrap();
///
/// let near = tree.range_search_by_id(0, 1.0).unwrap();
/// assert_eq!(near.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 2]);
/// ```
pub struct MTree<R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    pub(crate) page_file: PageFile<MetricNode>,
    pub(crate) relation: R,
    pub(crate) distance: D,
    pub(crate) config: MTreeConfig,
    pub(crate) header: TreeHeader,
    pub(crate) capacities: Capacities,
    rng: StdRng,
}

/// Distance between two objects of `relation`, by id.
fn object_distance<R, D>(relation: &R, distance: &D, a: ObjectId, b: ObjectId) -> IndexResult<f64>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    distance.distance(relation.fetch(a)?, relation.fetch(b)?)
}

impl<R, D> MTree<R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    /// Creates an empty tree whose pages stay in memory.
    pub fn in_memory(config: MTreeConfig, relation: R, distance: D) -> IndexResult<Self> {
        let store = MemoryPageStore::new(config.page.page_size)?;
        Self::create_with_store(Box::new(store), config, relation, distance)
    }

    /// Creates an empty tree in a new page file at `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        config: MTreeConfig,
        relation: R,
        distance: D,
    ) -> IndexResult<Self> {
        config.validate()?;
        let store = FilePageStore::create(
            path.as_ref(),
            config.page.page_size,
            config.page.reserved_pages,
        )?;
        Self::create_with_store(Box::new(store), config, relation, distance)
    }

    /// Opens the tree stored at `path` over the same relation it was built
    /// from.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: MTreeConfig,
        relation: R,
        distance: D,
    ) -> IndexResult<Self> {
        let store = FilePageStore::open(path.as_ref())?;
        Self::open_with_store(Box::new(store), config, relation, distance)
    }

    pub fn create_with_store(
        store: Box<dyn PageStore>,
        config: MTreeConfig,
        relation: R,
        distance: D,
    ) -> IndexResult<Self> {
        config.validate()?;
        let page_file = PageFile::create(store, config.page.cache_pages)?;
        let capacities = Self::fit_capacities(&config, page_file.payload_capacity())?;
        let mut header = TreeHeader::empty(IndexKind::MTree);
        header.leaf_capacity = capacities.leaf_capacity;
        header.directory_capacity = capacities.directory_capacity;
        header.leaf_minimum = capacities.leaf_minimum;
        header.directory_minimum = capacities.directory_minimum;
        header.k_max = config.k_max.unwrap_or(0);
        let tree = Self {
            page_file,
            relation,
            distance,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            header,
            capacities,
        };
        tree.persist_header()?;
        info!(
            "Created M-tree: leaf capacity {}, directory capacity {}",
            capacities.leaf_capacity, capacities.directory_capacity
        );
        Ok(tree)
    }

    pub fn open_with_store(
        store: Box<dyn PageStore>,
        config: MTreeConfig,
        relation: R,
        distance: D,
    ) -> IndexResult<Self> {
        config.validate()?;
        let page_file = PageFile::open(store, config.page.cache_pages)?;
        let header: TreeHeader = page_file
            .tree_header()?
            .ok_or_else(|| IndexError::Corrupted("page file holds no tree header".into()))?;
        if header.kind != IndexKind::MTree {
            return Err(IndexError::InvalidConfig(format!(
                "page file holds a {:?} tree, not an M-tree",
                header.kind
            )));
        }
        if let Some(k_max) = config.k_max {
            if k_max != header.k_max {
                return Err(IndexError::InvalidConfig(format!(
                    "page file keeps {}-nearest-neighbor distances, configured for {}",
                    header.k_max, k_max
                )));
            }
        }
        let capacities = Capacities {
            leaf_capacity: header.leaf_capacity,
            directory_capacity: header.directory_capacity,
            leaf_minimum: header.leaf_minimum,
            directory_minimum: header.directory_minimum,
        };
        info!(
            "Opened M-tree: {} entries, height {}",
            header.entry_count, header.height
        );
        Ok(Self {
            page_file,
            relation,
            distance,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            header,
            capacities,
        })
    }

    fn fit_capacities(config: &MTreeConfig, payload: usize) -> IndexResult<Capacities> {
        let page = &config.page;
        if let (Some(leaf), Some(dir)) = (page.leaf_capacity, page.directory_capacity) {
            return Capacities::new(leaf, dir, page.min_fill_factor);
        }
        let fit = Capacities::from_page(
            payload,
            &MetricNode::new_leaf(0, 0, Vec::new()),
            &MetricLeafEntry {
                id: 0,
                parent_distance: 0.0,
                knn_distance: 0.0,
            },
            &MetricNode::new_directory(0, 0, Vec::new()),
            &MetricDirectoryEntry {
                page_id: 0,
                routing_id: 0,
                covering_radius: 0.0,
                parent_distance: 0.0,
                knn_distance: 0.0,
            },
            page.min_fill_factor,
        )?;
        Capacities::new(
            page.leaf_capacity.unwrap_or(fit.leaf_capacity),
            page.directory_capacity.unwrap_or(fit.directory_capacity),
            page.min_fill_factor,
        )
    }

    pub fn size(&self) -> u64 {
        self.header.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.root.is_none()
    }

    pub fn height(&self) -> usize {
        self.header.height
    }

    pub fn capacities(&self) -> Capacities {
        self.capacities
    }

    pub fn config(&self) -> &MTreeConfig {
        &self.config
    }

    pub fn relation(&self) -> &R {
        &self.relation
    }

    /// The relation, for changes to objects the tree no longer indexes.
    pub fn relation_mut(&mut self) -> &mut R {
        &mut self.relation
    }

    /// Largest `k` reverse nearest-neighbor queries accept, if the tree
    /// keeps neighbor distances at all.
    pub fn k_max(&self) -> Option<usize> {
        (self.header.k_max > 0).then_some(self.header.k_max)
    }

    pub(crate) fn root_page(&self) -> Option<PageId> {
        self.header.root
    }

    pub fn stats(&self) -> TreeStats {
        let page_stats = self.page_file.stats();
        TreeStats {
            total_entries: self.header.entry_count,
            tree_height: self.header.height,
            leaf_capacity: self.capacities.leaf_capacity,
            directory_capacity: self.capacities.directory_capacity,
            cached_pages: page_stats.cached_pages,
            cache_hits: page_stats.cache_hits,
            cache_misses: page_stats.cache_misses,
            page_reads: page_stats.page_reads,
            page_writes: page_stats.page_writes,
            allocated_pages: page_stats.allocated_pages,
            free_pages: page_stats.free_pages,
        }
    }

    pub fn flush(&self) -> IndexResult<()> {
        self.persist_header()?;
        self.page_file.flush()
    }

    pub fn close(&self) -> IndexResult<()> {
        if self.page_file.is_closed() {
            return Ok(());
        }
        self.persist_header()?;
        self.page_file.close()?;
        info!("Closed M-tree");
        Ok(())
    }

    pub(crate) fn check_open(&self) -> IndexResult<()> {
        if self.page_file.is_closed() {
            return Err(IndexError::Closed);
        }
        Ok(())
    }

    pub(crate) fn read_node(&self, page_id: PageId) -> IndexResult<MetricNode> {
        self.page_file.read_page(page_id)
    }

    pub(crate) fn write_node(&self, node: MetricNode) -> IndexResult<()> {
        self.page_file.write_page(node.page_id, node)
    }

    fn persist_header(&self) -> IndexResult<()> {
        self.page_file.set_tree_header(&self.header)
    }

    pub(crate) fn distance_between(&self, a: ObjectId, b: ObjectId) -> IndexResult<f64> {
        object_distance(&self.relation, &self.distance, a, b)
    }

    /// Routing object of the node reached by `path`; `None` for the root.
    pub(crate) fn routing_of(&self, path: &[PathStep]) -> IndexResult<Option<ObjectId>> {
        let Some(&(parent_id, index)) = path.last() else {
            return Ok(None);
        };
        let parent = self.read_node(parent_id)?;
        parent
            .directory_entries()?
            .get(index)
            .map(|e| Some(e.routing_id))
            .ok_or_else(|| stale_path(parent_id, index))
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Indexes the relation object `id`.
    pub fn insert(&mut self, id: ObjectId) -> IndexResult<()> {
        self.check_open()?;
        self.relation.fetch(id)?;
        self.insert_entry(self.new_leaf_entry(id))?;
        self.header.entry_count += 1;
        self.refresh_knn_distances(Some(id))?;
        self.persist_header()
    }

    /// Indexes all `ids` in an empty tree.
    ///
    /// No packing is done: the objects are inserted one at a time in the
    /// given order, through the same split path as [`MTree::insert`]. Only
    /// the k-nearest-neighbor distances are computed once, at the end.
    pub fn bulk_load(&mut self, ids: Vec<ObjectId>) -> IndexResult<()> {
        self.check_open()?;
        if self.header.root.is_some() {
            return Err(IndexError::InvalidOperation(
                "bulk load requires an empty tree".into(),
            ));
        }
        for &id in &ids {
            self.relation.fetch(id)?;
        }
        for &id in &ids {
            self.insert_entry(self.new_leaf_entry(id))?;
            self.header.entry_count += 1;
        }
        self.refresh_knn_distances(None)?;
        self.persist_header()?;
        info!(
            "Bulk loaded {} objects into the M-tree: height {}",
            ids.len(),
            self.header.height
        );
        Ok(())
    }

    /// A leaf entry whose neighbor distance is still to be computed.
    fn new_leaf_entry(&self, id: ObjectId) -> MetricLeafEntry {
        MetricLeafEntry {
            id,
            parent_distance: 0.0,
            knn_distance: if self.k_max().is_some() { f64::INFINITY } else { 0.0 },
        }
    }

    fn insert_entry(&mut self, mut entry: MetricLeafEntry) -> IndexResult<()> {
        let Some(root) = self.header.root else {
            let page_id = self.page_file.allocate_page()?;
            entry.parent_distance = 0.0;
            self.write_node(Node::new_leaf(
                page_id,
                self.capacities.leaf_capacity,
                vec![entry],
            ))?;
            self.header.root = Some(page_id);
            self.header.height = 1;
            return Ok(());
        };

        let mut path = Vec::with_capacity(self.header.height);
        let mut parent_distance = 0.0;
        let mut node = self.read_node(root)?;
        while !node.is_leaf() {
            let entries = node.directory_entries()?;
            let (index, distance) = self.choose_subtree(entries, entry.id)?;
            path.push((node.page_id, index));
            parent_distance = distance;
            let child = entries[index].page_id;
            node = self.read_node(child)?;
        }
        entry.parent_distance = parent_distance;
        node.leaf_entries_mut()?.push(entry);
        self.adjust_tree(path, node)
    }

    /// Index of the child to descend into and the object's distance to its
    /// routing object.
    fn choose_subtree(
        &self,
        entries: &[MetricDirectoryEntry],
        id: ObjectId,
    ) -> IndexResult<(usize, f64)> {
        let mut inside: Option<(usize, f64)> = None;
        let mut outside: Option<(usize, f64, f64)> = None;
        for (i, entry) in entries.iter().enumerate() {
            let d = self.distance_between(id, entry.routing_id)?;
            if d <= entry.covering_radius {
                if inside.map_or(true, |(_, best)| d < best) {
                    inside = Some((i, d));
                }
            } else {
                let enlargement = d - entry.covering_radius;
                if outside.map_or(true, |(_, best, _)| enlargement < best) {
                    outside = Some((i, enlargement, d));
                }
            }
        }
        inside
            .or(outside.map(|(i, _, d)| (i, d)))
            .ok_or_else(|| IndexError::Corrupted("directory node without entries".into()))
    }

    /// Writes `node` and walks up `path`, splitting overflowing nodes and
    /// refreshing routing objects, covering radii and neighbor distances
    /// until nothing changes.
    fn adjust_tree(&mut self, mut path: Vec<PathStep>, mut node: MetricNode) -> IndexResult<()> {
        loop {
            if node.is_overflowing() {
                let routing = self.routing_of(&path)?;
                let (left, right, first, second) = self.split_node(node, routing)?;
                let left_id = left.page_id;
                let right_id = right.page_id;
                let (left_knn, right_knn) = (knn_aggregate(&left), knn_aggregate(&right));
                debug!(
                    "Split page {}: {} + {} entries on new page {}",
                    left_id,
                    left.len(),
                    right.len(),
                    right_id
                );
                self.write_node(left)?;
                self.write_node(right)?;

                let Some((parent_id, index)) = path.pop() else {
                    self.grow_root(
                        directory_entry(left_id, first, 0.0, left_knn),
                        directory_entry(right_id, second, 0.0, right_knn),
                    )?;
                    return Ok(());
                };
                let parent_routing = self.routing_of(&path)?;
                let (d1, d2) = match parent_routing {
                    Some(p) => (
                        self.distance_between(first.0, p)?,
                        self.distance_between(second.0, p)?,
                    ),
                    None => (0.0, 0.0),
                };
                let mut parent = self.read_node(parent_id)?;
                let entries = parent.directory_entries_mut()?;
                if index >= entries.len() {
                    return Err(stale_path(parent_id, index));
                }
                entries[index] = directory_entry(left_id, first, d1, left_knn);
                entries.push(directory_entry(right_id, second, d2, right_knn));
                node = parent;
                continue;
            }

            let Some((parent_id, index)) = path.pop() else {
                return self.write_node(node);
            };
            let above = self.routing_of(&path)?;
            let mut parent = self.read_node(parent_id)?;
            let entry = parent
                .directory_entries_mut()?
                .get_mut(index)
                .ok_or_else(|| stale_path(parent_id, index))?;
            let recentered = self.recenter(entry, &mut node, above)?;
            let radius = covering_radius(&node);
            let knn = knn_aggregate(&node);
            self.write_node(node)?;
            if !recentered && entry.covering_radius == radius && entry.knn_distance == knn {
                return Ok(());
            }
            entry.covering_radius = radius;
            entry.knn_distance = knn;
            node = parent;
        }
    }

    /// Splits an overflowing node. The first half keeps the page. Returns
    /// both halves with `(routing_id, covering_radius)` of each.
    #[allow(clippy::type_complexity)]
    fn split_node(
        &mut self,
        node: MetricNode,
        routing: Option<ObjectId>,
    ) -> IndexResult<(MetricNode, MetricNode, (ObjectId, f64), (ObjectId, f64))> {
        let right_id = self.page_file.allocate_page()?;
        let page_id = node.page_id;
        let caps = self.capacities;
        let promotion = self.config.promotion;
        let distribution = self.config.distribution;
        let relation = &self.relation;
        let distance = &self.distance;
        let measure = |a: ObjectId, b: ObjectId| object_distance(relation, distance, a, b);
        match node.entries {
            NodeEntries::Leaf(entries) => {
                let result = split::split(
                    entries,
                    routing,
                    promotion,
                    distribution,
                    caps.leaf_minimum,
                    &mut self.rng,
                    measure,
                )?;
                let (first, second) = (summary(&result.first), summary(&result.second));
                Ok((
                    Node::new_leaf(page_id, caps.leaf_capacity, result.first.entries),
                    Node::new_leaf(right_id, caps.leaf_capacity, result.second.entries),
                    first,
                    second,
                ))
            }
            NodeEntries::Directory(entries) => {
                let result = split::split(
                    entries,
                    routing,
                    promotion,
                    distribution,
                    caps.directory_minimum,
                    &mut self.rng,
                    measure,
                )?;
                let (first, second) = (summary(&result.first), summary(&result.second));
                Ok((
                    Node::new_directory(page_id, caps.directory_capacity, result.first.entries),
                    Node::new_directory(right_id, caps.directory_capacity, result.second.entries),
                    first,
                    second,
                ))
            }
        }
    }

    /// Keeps the routing object of `entry` among the objects directly in
    /// `node`, the child it points to. Once that object has left the node,
    /// the entry nearest to it takes over and the parent distances inside
    /// `node` are measured anew. `above` is the routing object of the node
    /// holding `entry`. Returns true if the routing object changed.
    fn recenter(
        &self,
        entry: &mut MetricDirectoryEntry,
        node: &mut MetricNode,
        above: Option<ObjectId>,
    ) -> IndexResult<bool> {
        if node.is_empty() || entry_objects(node).contains(&entry.routing_id) {
            return Ok(false);
        }
        let routing_id = match &node.entries {
            NodeEntries::Leaf(entries) => nearest_to_routing(entries),
            NodeEntries::Directory(entries) => nearest_to_routing(entries),
        }
        .ok_or_else(|| IndexError::Corrupted(format!("page {} has no entries", node.page_id)))?;
        match &mut node.entries {
            NodeEntries::Leaf(entries) => self.measure_from(routing_id, entries)?,
            NodeEntries::Directory(entries) => self.measure_from(routing_id, entries)?,
        }
        debug!(
            "Page {} now routed by object {} instead of {}",
            node.page_id, routing_id, entry.routing_id
        );
        entry.routing_id = routing_id;
        entry.covering_radius = covering_radius(node);
        entry.parent_distance = match above {
            Some(above) => self.distance_between(routing_id, above)?,
            None => 0.0,
        };
        Ok(true)
    }

    fn measure_from<E: MetricEntry>(&self, routing_id: ObjectId, entries: &mut [E]) -> IndexResult<()> {
        for entry in entries {
            let d = self.distance_between(entry.object_id(), routing_id)?;
            entry.set_parent_distance(d);
        }
        Ok(())
    }

    fn grow_root(
        &mut self,
        left: MetricDirectoryEntry,
        right: MetricDirectoryEntry,
    ) -> IndexResult<()> {
        let root_id = self.page_file.allocate_page()?;
        self.write_node(Node::new_directory(
            root_id,
            self.capacities.directory_capacity,
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

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Removes one entry of the object `id`. Returns false if it is not
    /// indexed.
    ///
    /// The object must still be present in the relation, since locating it
    /// needs its distances. Afterwards no entry refers to it any more and it
    /// may be dropped from the relation.
    pub fn delete(&mut self, id: ObjectId) -> IndexResult<bool> {
        self.check_open()?;
        self.relation.fetch(id)?;
        let Some(root) = self.header.root else {
            return Ok(false);
        };
        let mut path = Vec::new();
        let Some(mut leaf) = self.find_leaf(root, id, &mut path)? else {
            return Ok(false);
        };
        let entries = leaf.leaf_entries_mut()?;
        if let Some(position) = entries.iter().position(|e| e.id == id) {
            entries.remove(position);
        }

        let orphans = self.condense_tree(path, leaf)?;
        if !orphans.is_empty() {
            debug!("Reinserting {} orphaned objects", orphans.len());
        }
        for orphan in orphans {
            self.insert_entry(orphan)?;
        }
        self.header.entry_count = self.header.entry_count.saturating_sub(1);
        self.refresh_knn_distances(Some(id))?;
        self.persist_header()?;
        Ok(true)
    }

    fn find_leaf(
        &self,
        page_id: PageId,
        id: ObjectId,
        path: &mut Vec<PathStep>,
    ) -> IndexResult<Option<MetricNode>> {
        let node = self.read_node(page_id)?;
        match &node.entries {
            NodeEntries::Leaf(entries) => Ok(entries.iter().any(|e| e.id == id).then_some(node)),
            NodeEntries::Directory(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    let d = self.distance_between(id, entry.routing_id)?;
                    if !within_radius(d, entry.covering_radius) {
                        continue;
                    }
                    path.push((page_id, index));
                    if let Some(leaf) = self.find_leaf(entry.page_id, id, path)? {
                        return Ok(Some(leaf));
                    }
                    path.pop();
                }
                Ok(None)
            }
        }
    }

    /// Dissolves underfull nodes on the way up and refreshes the routing
    /// objects, covering radii and neighbor distances of the others.
    /// Returns the leaf entries of dissolved subtrees.
    fn condense_tree(
        &mut self,
        mut path: Vec<PathStep>,
        mut node: MetricNode,
    ) -> IndexResult<Vec<MetricLeafEntry>> {
        let mut orphans = Vec::new();
        loop {
            let Some((parent_id, index)) = path.pop() else {
                self.settle_root(node)?;
                return Ok(orphans);
            };
            let above = self.routing_of(&path)?;
            let mut parent = self.read_node(parent_id)?;
            let entries = parent.directory_entries_mut()?;
            if index >= entries.len() {
                return Err(stale_path(parent_id, index));
            }
            if node.len() < self.capacities.minimum(node.is_leaf()) {
                entries.remove(index);
                self.dissolve(node, &mut orphans)?;
            } else {
                let entry = &mut entries[index];
                self.recenter(entry, &mut node, above)?;
                entry.covering_radius = covering_radius(&node);
                entry.knn_distance = knn_aggregate(&node);
                self.write_node(node)?;
            }
            node = parent;
        }
    }

    fn dissolve(&self, node: MetricNode, orphans: &mut Vec<MetricLeafEntry>) -> IndexResult<()> {
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

    fn settle_root(&mut self, mut root: MetricNode) -> IndexResult<()> {
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
}

fn summary<E>(group: &MetricGroup<E>) -> (ObjectId, f64) {
    (group.routing_id, group.covering_radius)
}

fn directory_entry(
    page_id: PageId,
    (routing_id, covering_radius): (ObjectId, f64),
    parent_distance: f64,
    knn_distance: f64,
) -> MetricDirectoryEntry {
    MetricDirectoryEntry {
        page_id,
        routing_id,
        covering_radius,
        parent_distance,
        knn_distance,
    }
}

/// The entry closest to the routing object its parent distances refer to.
fn nearest_to_routing<E: MetricEntry>(entries: &[E]) -> Option<ObjectId> {
    entries
        .iter()
        .min_by(|a, b| a.parent_distance().total_cmp(&b.parent_distance()))
        .map(|e| e.object_id())
}

fn stale_path(page_id: PageId, index: usize) -> IndexError {
    IndexError::Corrupted(format!("page {} has no entry {}", page_id, index))
}
