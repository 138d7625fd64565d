//! Structural verification of the M-tree.

use log::info;

use crate::distance::DistanceFunction;
use crate::errors::IndexResult;
use crate::integrity::IntegrityReport;
use crate::mtree::entry::{entry_objects, knn_aggregate, MetricDirectoryEntry, MetricEntry};
use crate::mtree::tree::{within_radius, MTree, RADIUS_TOLERANCE};
use crate::node::NodeEntries;
use crate::relation::Relation;
use crate::types::{ObjectId, PageId};

impl<R, D> MTree<R, D>
where
    R: Relation,
    D: DistanceFunction<R::Object>,
{
    /// Walks the whole tree and verifies fill, leaf depth, stored parent
    /// distances, covering radii and the entry count. Routing objects must
    /// be centers of entries in the node they route, and kept
    /// nearest-neighbor distances must match fresh queries.
    ///
    /// Parent distances of root entries carry no meaning and are skipped.
    pub fn check_integrity(&self) -> IndexResult<IntegrityReport> {
        self.check_open()?;
        let mut report = IntegrityReport::new();
        let Some(root) = self.root_page() else {
            if self.header.entry_count != 0 || self.header.height != 0 {
                report.fail_tree(format!(
                    "empty tree records {} entries and height {}",
                    self.header.entry_count, self.header.height
                ));
            }
            return Ok(report);
        };

        self.check_node(root, 0, None, &mut report)?;

        if report.entries_checked != self.header.entry_count {
            report.fail_tree(format!(
                "found {} objects, header records {}",
                report.entries_checked, self.header.entry_count
            ));
        }
        if let Some(depth) = report.leaf_depth {
            if depth + 1 != self.header.height {
                report.fail_tree(format!(
                    "leaves at depth {} in a tree of height {}",
                    depth, self.header.height
                ));
            }
        }
        info!(
            "Checked {} M-tree pages and {} objects: {}",
            report.pages_checked,
            report.entries_checked,
            if report.is_valid { "valid" } else { "INVALID" }
        );
        Ok(report)
    }

    fn check_node(
        &self,
        page_id: PageId,
        depth: usize,
        parent_entry: Option<&MetricDirectoryEntry>,
        report: &mut IntegrityReport,
    ) -> IndexResult<()> {
        let node = self.read_node(page_id)?;
        report.pages_checked += 1;
        let caps = self.capacities;

        if node.page_id != page_id {
            report.fail(page_id, format!("node claims page id {}", node.page_id));
        }
        if node.is_empty() {
            report.fail(page_id, "node has no entries".into());
            return Ok(());
        }
        let capacity = caps.capacity(node.is_leaf());
        if node.capacity != capacity || node.len() > capacity {
            report.fail(
                page_id,
                format!(
                    "{} entries with capacity {} (expected capacity {})",
                    node.len(),
                    node.capacity,
                    capacity
                ),
            );
        }
        let minimum = caps.minimum(node.is_leaf());
        if parent_entry.is_some() && node.len() < minimum {
            report.fail(
                page_id,
                format!("{} entries, below the minimum {}", node.len(), minimum),
            );
        }
        if let Some(parent) = parent_entry {
            if !entry_objects(&node).contains(&parent.routing_id) {
                report.fail(
                    page_id,
                    format!("routing object {} is not an entry of the node", parent.routing_id),
                );
            }
            let aggregate = knn_aggregate(&node);
            if parent.knn_distance != aggregate {
                report.fail(
                    page_id,
                    format!(
                        "parent keeps neighbor distance {}, entries reach {}",
                        parent.knn_distance, aggregate
                    ),
                );
            }
        }

        match &node.entries {
            NodeEntries::Leaf(entries) => {
                report.check_leaf_depth(page_id, depth);
                for entry in entries {
                    report.entries_checked += 1;
                    if self.relation.get(entry.id).is_none() {
                        report.fail(
                            page_id,
                            format!("object {} is missing from the relation", entry.id),
                        );
                        continue;
                    }
                    if let Some(parent) = parent_entry {
                        self.check_entry(page_id, parent, entry, report)?;
                    }
                    self.check_knn_distance(page_id, entry.id, entry.knn_distance, report)?;
                }
            }
            NodeEntries::Directory(entries) => {
                for entry in entries {
                    if let Some(parent) = parent_entry {
                        self.check_entry(page_id, parent, entry, report)?;
                    }
                    self.check_node(entry.page_id, depth + 1, Some(entry), report)?;
                }
            }
        }
        Ok(())
    }

    fn check_knn_distance(
        &self,
        page_id: PageId,
        id: ObjectId,
        stored: f64,
        report: &mut IntegrityReport,
    ) -> IndexResult<()> {
        let expected = match self.k_max() {
            Some(k_max) => self.knn_distance_of(id, k_max)?,
            None => 0.0,
        };
        let matches = if expected.is_finite() {
            (expected - stored).abs() <= RADIUS_TOLERANCE * (expected + stored).max(1.0)
        } else {
            stored == expected
        };
        if !matches {
            report.fail(
                page_id,
                format!(
                    "object {} keeps neighbor distance {}, actual {}",
                    id, stored, expected
                ),
            );
        }
        Ok(())
    }

    /// Compares the stored parent distance of `entry` with the real one and
    /// checks that the parent's ball covers the entry's ball.
    fn check_entry<E: MetricEntry>(
        &self,
        page_id: PageId,
        parent: &MetricDirectoryEntry,
        entry: &E,
        report: &mut IntegrityReport,
    ) -> IndexResult<()> {
        let actual = self.distance_between(entry.object_id(), parent.routing_id)?;
        let stored = entry.parent_distance();
        if (actual - stored).abs() > RADIUS_TOLERANCE * (actual + stored).max(1.0) {
            report.fail(
                page_id,
                format!(
                    "entry {} stores parent distance {}, actual {}",
                    entry.object_id(),
                    stored,
                    actual
                ),
            );
        }
        if !within_radius(stored + entry.radius(), parent.covering_radius) {
            report.fail(
                page_id,
                format!(
                    "entry {} reaches {} beyond covering radius {}",
                    entry.object_id(),
                    stored + entry.radius(),
                    parent.covering_radius
                ),
            );
        }
        Ok(())
    }
}
