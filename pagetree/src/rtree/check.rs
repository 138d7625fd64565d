//! Structural verification of the spatial trees.

use log::info;

use crate::distance::SpatialDistance;
use crate::errors::IndexResult;
use crate::integrity::IntegrityReport;
use crate::node::NodeEntries;
use crate::rtree::entry::{node_flags, node_mbr, SpatialDirectoryEntry};
use crate::rtree::tree::RStarTree;
use crate::spatial::mbr;
use crate::types::PageId;

impl<D: SpatialDistance> RStarTree<D> {
    /// Walks the whole tree and verifies fill, containment, handled flags,
    /// leaf depth and the entry count.
    ///
    /// Unreadable pages abort the walk with their error; every other
    /// violation is collected in the report.
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
            "Checked {} pages and {} objects: {}",
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
        parent_entry: Option<&SpatialDirectoryEntry>,
        report: &mut IntegrityReport,
    ) -> IndexResult<()> {
        let node = self.read_node(page_id)?;
        report.pages_checked += 1;
        let caps = self.require_capacities()?;
        let dims = self.header.dimensionality;

        if node.page_id != page_id {
            report.fail(page_id, format!("node claims page id {}", node.page_id));
        }
        if node.is_empty() {
            report.fail(page_id, "node has no entries".into());
            return Ok(());
        }

        let regular = caps.capacity(node.is_leaf());
        let supernode_ok = !node.is_leaf()
            && self.xsplitter()?.is_some()
            && node.capacity % caps.directory_capacity == 0;
        if node.capacity != regular && !supernode_ok {
            report.fail(
                page_id,
                format!("capacity {} (expected {})", node.capacity, regular),
            );
        }
        if node.len() > node.capacity {
            report.fail(
                page_id,
                format!("{} entries exceed capacity {}", node.len(), node.capacity),
            );
        }
        let minimum = self.minimum_entries(node.is_leaf())?;
        if parent_entry.is_some() && node.len() < minimum {
            report.fail(
                page_id,
                format!("{} entries, below the minimum {}", node.len(), minimum),
            );
        }

        if let Some(entry) = parent_entry {
            match node_mbr(&node) {
                Some(bounds) if mbr::contains(&entry.mbr, &bounds) => {}
                _ => report.fail(page_id, "node is not covered by its parent entry".into()),
            }
            if (entry.has_handled, entry.has_unhandled) != node_flags(&node) {
                report.fail(page_id, "parent entry has stale handled flags".into());
            }
        }

        match &node.entries {
            NodeEntries::Leaf(entries) => {
                report.check_leaf_depth(page_id, depth);
                for entry in entries {
                    report.entries_checked += 1;
                    if entry.point.len() != dims {
                        report.fail(
                            page_id,
                            format!("object {} has {} coordinates", entry.id, entry.point.len()),
                        );
                    }
                }
            }
            NodeEntries::Directory(entries) => {
                for entry in entries {
                    if entry.mbr.min.len() != dims {
                        report.fail(
                            page_id,
                            format!(
                                "child {} has a {}-dimensional rectangle",
                                entry.page_id,
                                entry.mbr.min.len()
                            ),
                        );
                    }
                    self.check_node(entry.page_id, depth + 1, Some(entry), report)?;
                }
            }
        }
        Ok(())
    }
}
