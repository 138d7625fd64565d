//! Structural verification results shared by both tree families.

use log::error;

use crate::types::PageId;

/// Findings of a full tree walk.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    /// Total pages checked
    pub pages_checked: u64,
    /// Leaf entries found below the root
    pub entries_checked: u64,
    /// Depth of the leaves, if all leaves share one
    pub leaf_depth: Option<usize>,
    /// Pages on which a violation was found
    pub invalid_pages: Vec<PageId>,
    /// Summary of findings
    pub is_valid: bool,
    /// Detailed error messages
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn new() -> Self {
        Self {
            pages_checked: 0,
            entries_checked: 0,
            leaf_depth: None,
            invalid_pages: Vec::new(),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Records a violation found on `page_id`.
    pub fn fail(&mut self, page_id: PageId, message: String) {
        error!("Integrity violation on page {}: {}", page_id, message);
        self.is_valid = false;
        if !self.invalid_pages.contains(&page_id) {
            self.invalid_pages.push(page_id);
        }
        self.errors.push(message);
    }

    /// Records a violation not tied to one page.
    pub fn fail_tree(&mut self, message: String) {
        error!("Integrity violation: {}", message);
        self.is_valid = false;
        self.errors.push(message);
    }

    /// Checks that a leaf at `depth` matches the depth of the leaves seen
    /// before it.
    pub fn check_leaf_depth(&mut self, page_id: PageId, depth: usize) {
        match self.leaf_depth {
            None => self.leaf_depth = Some(depth),
            Some(expected) if expected != depth => self.fail(
                page_id,
                format!("leaf at depth {} (other leaves at depth {})", depth, expected),
            ),
            Some(_) => {}
        }
    }
}

impl Default for IntegrityReport {
    fn default() -> Self {
        Self::new()
    }
}
