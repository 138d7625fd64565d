//! Tree configuration and fluent builders.
//!
//! Configurations are plain structs. Every value is checked once, in
//! `build()`, so a tree never starts with parameters it cannot honor.

use crate::errors::{IndexError, IndexResult};
use crate::mtree::{Distribution, Promotion};
use crate::page::constants::{DEFAULT_CACHE_PAGES, DEFAULT_MIN_FILL, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::rtree::{BulkSplit, InsertionStrategy, OverflowTreatment, SplitStrategy};
use crate::spatial::SpatialSorter;

/// Maximum overlap ratio an X-tree directory split may produce.
pub const DEFAULT_MAX_OVERLAP: f64 = 0.2;

/// Minimum share of entries on each side of an overlap-minimal split.
pub const DEFAULT_MIN_FANOUT: f64 = 0.3;

/// The family of spatial tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TreeVariant {
    RStar,
    /// Directory splits with too much overlap are avoided, first by a split
    /// along the split history, then by growing a supernode.
    XTree { max_overlap: f64, min_fanout: f64 },
}

impl TreeVariant {
    pub fn xtree() -> Self {
        TreeVariant::XTree {
            max_overlap: DEFAULT_MAX_OVERLAP,
            min_fanout: DEFAULT_MIN_FANOUT,
        }
    }
}

/// Settings shared by the spatial and metric trees.
#[derive(Debug, Clone, PartialEq)]
pub struct PageConfig {
    pub page_size: usize,
    /// Maximum number of cached pages; 0 keeps every page in memory.
    pub cache_pages: usize,
    /// Extra page slots reserved for file metadata.
    pub reserved_pages: u32,
    pub min_fill_factor: f64,
    /// Explicit leaf capacity instead of the one derived from the page size.
    pub leaf_capacity: Option<usize>,
    /// Explicit directory capacity instead of the one derived from the page size.
    pub directory_capacity: Option<usize>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: DEFAULT_CACHE_PAGES,
            reserved_pages: 0,
            min_fill_factor: DEFAULT_MIN_FILL,
            leaf_capacity: None,
            directory_capacity: None,
        }
    }
}

impl PageConfig {
    fn validate(&self) -> IndexResult<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} below minimum {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        if self.page_size > u32::MAX as usize {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} does not fit the file header",
                self.page_size
            )));
        }
        if !(self.min_fill_factor > 0.0 && self.min_fill_factor <= 0.5) {
            return Err(IndexError::InvalidConfig(format!(
                "minimum fill factor {} must be in (0, 0.5]",
                self.min_fill_factor
            )));
        }
        for (what, cap) in [
            ("leaf", self.leaf_capacity),
            ("directory", self.directory_capacity),
        ] {
            if let Some(cap) = cap {
                if cap < 3 {
                    return Err(IndexError::InvalidConfig(format!(
                        "{} capacity {} is too small (minimum 3)",
                        what, cap
                    )));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Spatial trees
// ============================================================================

/// Configuration of an R*-tree or X-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    pub page: PageConfig,
    pub split_strategy: SplitStrategy,
    pub insertion_strategy: InsertionStrategy,
    pub bulk_split: BulkSplit,
    pub overflow_treatment: OverflowTreatment,
    pub variant: TreeVariant,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            split_strategy: SplitStrategy::Topological,
            insertion_strategy: InsertionStrategy::Combined,
            bulk_split: BulkSplit::SortTileRecursive,
            overflow_treatment: OverflowTreatment::default(),
            variant: TreeVariant::RStar,
        }
    }
}

impl TreeConfig {
    pub fn builder() -> TreeConfigBuilder {
        TreeConfigBuilder::new()
    }

    /// Checks every parameter.
    pub fn validate(&self) -> IndexResult<()> {
        self.page.validate()?;
        if let OverflowTreatment::Reinsert { fraction, .. } = self.overflow_treatment {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(IndexError::InvalidConfig(format!(
                    "reinsert fraction {} must be in (0, 1)",
                    fraction
                )));
            }
        }
        if let InsertionStrategy::ApproximateLeastOverlap { candidates } = self.insertion_strategy
        {
            if candidates == 0 {
                return Err(IndexError::InvalidConfig(
                    "approximate least overlap needs at least one candidate".into(),
                ));
            }
        }
        if let TreeVariant::XTree {
            max_overlap,
            min_fanout,
        } = self.variant
        {
            if !(0.0..=1.0).contains(&max_overlap) {
                return Err(IndexError::InvalidConfig(format!(
                    "maximum overlap {} must be in [0, 1]",
                    max_overlap
                )));
            }
            if !(min_fanout > 0.0 && min_fanout <= 0.5) {
                return Err(IndexError::InvalidConfig(format!(
                    "minimum fanout {} must be in (0, 0.5]",
                    min_fanout
                )));
            }
        }
        Ok(())
    }
}

/// Fluent builder for [`TreeConfig`].
///
/// # Example
///
/// ```rust
/// use pagetree::config::{TreeConfig, TreeVariant};
/// use pagetree::rtree::BulkSplit;
///
/// let config = TreeConfig::builder()
///     .page_size(1024)
///     .cache_pages(64)
///     .bulk_split(BulkSplit::SortTileRecursive)
///     .variant(TreeVariant::xtree())
///     .build()
///     .unwrap();
/// assert_eq!(config.page.page_size, 1024);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeConfigBuilder {
    config: TreeConfig,
}

impl TreeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TreeConfig::default(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page.page_size = page_size;
        self
    }

    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        self.config.page.cache_pages = cache_pages;
        self
    }

    pub fn reserved_pages(mut self, reserved_pages: u32) -> Self {
        self.config.page.reserved_pages = reserved_pages;
        self
    }

    pub fn min_fill_factor(mut self, min_fill_factor: f64) -> Self {
        self.config.page.min_fill_factor = min_fill_factor;
        self
    }

    pub fn leaf_capacity(mut self, capacity: usize) -> Self {
        self.config.page.leaf_capacity = Some(capacity);
        self
    }

    pub fn directory_capacity(mut self, capacity: usize) -> Self {
        self.config.page.directory_capacity = Some(capacity);
        self
    }

    /// Sets leaf and directory capacity at once.
    pub fn node_capacity(self, capacity: usize) -> Self {
        self.leaf_capacity(capacity).directory_capacity(capacity)
    }

    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.config.split_strategy = strategy;
        self
    }

    pub fn insertion_strategy(mut self, strategy: InsertionStrategy) -> Self {
        self.config.insertion_strategy = strategy;
        self
    }

    pub fn bulk_split(mut self, bulk_split: BulkSplit) -> Self {
        self.config.bulk_split = bulk_split;
        self
    }

    /// Shorthand for `bulk_split(BulkSplit::SpatialSort(sorter))`.
    pub fn spatial_sort(self, sorter: SpatialSorter) -> Self {
        self.bulk_split(BulkSplit::SpatialSort(sorter))
    }

    pub fn overflow_treatment(mut self, treatment: OverflowTreatment) -> Self {
        self.config.overflow_treatment = treatment;
        self
    }

    pub fn variant(mut self, variant: TreeVariant) -> Self {
        self.config.variant = variant;
        self
    }

    pub fn build(self) -> IndexResult<TreeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Metric trees
// ============================================================================

/// Configuration of an M-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MTreeConfig {
    pub page: PageConfig,
    pub promotion: Promotion,
    pub distribution: Distribution,
    /// Seed of the random promotion.
    pub seed: u64,
    /// Keep each object's distance to its `k_max`-th nearest neighbor so
    /// that reverse nearest-neighbor queries up to `k_max` can be answered.
    pub k_max: Option<usize>,
}

impl Default for MTreeConfig {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            promotion: Promotion::MMRad,
            distribution: Distribution::GeneralizedHyperplane,
            seed: 0,
            k_max: None,
        }
    }
}

impl MTreeConfig {
    pub fn builder() -> MTreeConfigBuilder {
        MTreeConfigBuilder::new()
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.k_max == Some(0) {
            return Err(IndexError::InvalidConfig("k_max must be at least 1".into()));
        }
        self.page.validate()
    }
}

/// Fluent builder for [`MTreeConfig`].
#[derive(Debug, Clone, Default)]
pub struct MTreeConfigBuilder {
    config: MTreeConfig,
}

impl MTreeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MTreeConfig::default(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page.page_size = page_size;
        self
    }

    pub fn cache_pages(mut self, cache_pages: usize) -> Self {
        self.config.page.cache_pages = cache_pages;
        self
    }

    pub fn reserved_pages(mut self, reserved_pages: u32) -> Self {
        self.config.page.reserved_pages = reserved_pages;
        self
    }

    pub fn min_fill_factor(mut self, min_fill_factor: f64) -> Self {
        self.config.page.min_fill_factor = min_fill_factor;
        self
    }

    pub fn leaf_capacity(mut self, capacity: usize) -> Self {
        self.config.page.leaf_capacity = Some(capacity);
        self
    }

    pub fn directory_capacity(mut self, capacity: usize) -> Self {
        self.config.page.directory_capacity = Some(capacity);
        self
    }

    pub fn node_capacity(self, capacity: usize) -> Self {
        self.leaf_capacity(capacity).directory_capacity(capacity)
    }

    pub fn promotion(mut self, promotion: Promotion) -> Self {
        self.config.promotion = promotion;
        self
    }

    pub fn distribution(mut self, distribution: Distribution) -> Self {
        self.config.distribution = distribution;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Maintains k-nearest-neighbor distances for reverse queries up to
    /// `k_max`.
    pub fn reverse_knn(mut self, k_max: usize) -> Self {
        self.config.k_max = Some(k_max);
        self
    }

    pub fn build(self) -> IndexResult<MTreeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtree::ReinsertStrategy;

    #[test]
    fn test_defaults_are_valid() {
        let config = TreeConfig::builder().build().unwrap();
        assert_eq!(config.page.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.page.min_fill_factor, 0.5);
        assert_eq!(config.variant, TreeVariant::RStar);
        assert!(MTreeConfig::builder().build().is_ok());
    }

    #[test]
    fn test_builder_sets_capacities() {
        let config = TreeConfig::builder().node_capacity(10).build().unwrap();
        assert_eq!(config.page.leaf_capacity, Some(10));
        assert_eq!(config.page.directory_capacity, Some(10));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let too_small = TreeConfig::builder().page_size(16).build();
        assert!(matches!(too_small, Err(IndexError::InvalidConfig(_))));

        let bad_fill = TreeConfig::builder().min_fill_factor(0.7).build();
        assert!(matches!(bad_fill, Err(IndexError::InvalidConfig(_))));

        let tiny_node = MTreeConfig::builder().leaf_capacity(2).build();
        assert!(matches!(tiny_node, Err(IndexError::InvalidConfig(_))));

        let no_neighbors = MTreeConfig::builder().reverse_knn(0).build();
        assert!(matches!(no_neighbors, Err(IndexError::InvalidConfig(_))));

        let bad_fraction = TreeConfig::builder()
            .overflow_treatment(OverflowTreatment::Reinsert {
                strategy: ReinsertStrategy::Far,
                fraction: 1.5,
            })
            .build();
        assert!(matches!(bad_fraction, Err(IndexError::InvalidConfig(_))));

        let bad_overlap = TreeConfig::builder()
            .variant(TreeVariant::XTree {
                max_overlap: 2.0,
                min_fanout: 0.3,
            })
            .build();
        assert!(matches!(bad_overlap, Err(IndexError::InvalidConfig(_))));
    }
}
