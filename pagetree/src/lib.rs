//! # pagetree - Paged Spatial and Metric Index Trees
//!
//! This crate provides disk-backed index trees for similarity search:
//! an R*-tree over points with X-tree and handled-marking variants, and an
//! M-tree over arbitrary objects under a metric distance.
//!
//! ## Features
//!
//! - **Paged Storage**: Fixed-size pages in memory or in a file, loaded on demand
//! - **LRU Cache**: Frequently accessed pages kept deserialized in memory
//! - **Persistent**: Trees reopen from their page file with all settings
//! - **Pluggable Strategies**: Split, insertion, overflow and bulk-load policies
//! - **Queries**: Range, k-nearest-neighbor and lazy ascending-distance search
//! - **Reverse k-NN**: M-trees that keep neighbor distances answer reverse queries
//! - **Integrity Checks**: Full structural verification of either tree family
//!
//! ## R*-Tree
//!
//! ```rust
//! use pagetree::config::TreeConfig;
//! use pagetree::distance::Euclidean;
//! use pagetree::rtree::RStarTree;
//!
//! # fn main() -> Result<(), pagetree::IndexError> {
//! let config = TreeConfig::builder().node_capacity(8).build()?;
//! let mut tree = RStarTree::in_memory(config, Euclidean)?;
//! tree.insert(1, &[0.0, 0.0])?;
//! tree.insert(2, &[3.0, 4.0])?;
//!
//! let nearest = tree.knn_search(&[1.0, 1.0], 1)?;
//! assert_eq!(nearest[0].id, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## M-Tree
//!
//! ```rust
//! use pagetree::config::MTreeConfig;
//! use pagetree::distance::Levenshtein;
//! use pagetree::mtree::MTree;
//! use pagetree::relation::VecRelation;
//!
//! # fn main() -> Result<(), pagetree::IndexError> {
//! let words: VecRelation<String> = ["paged", "pages", "tree"]
//!     .iter()
//!     .map(|w| w.to_string())
//!     .collect();
//! let mut tree = MTree::in_memory(MTreeConfig::default(), words, Levenshtein)?;
//! tree.bulk_load(vec![0, 1, 2])?;
//!
//! let near = tree.range_search(&"paged".to_string(), 1.0)?;
//! assert_eq!(near.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod distance;
pub mod errors;
pub mod integrity;
pub mod mtree;
pub mod node;
pub mod page;
pub mod relation;
pub mod rtree;
pub mod search;
pub mod spatial;
pub mod types;

pub use config::{MTreeConfig, PageConfig, TreeConfig, TreeVariant};
pub use distance::{DistanceFunction, SpatialDistance};
pub use errors::{IndexError, IndexResult};
pub use integrity::IntegrityReport;
pub use mtree::MTree;
pub use page::{PageFile, PageStore};
pub use relation::{Relation, VecRelation};
pub use rtree::RStarTree;
pub use search::PrioritySearch;
pub use spatial::Mbr;
pub use types::{DistanceResult, IndexKind, ObjectId, PageId, QueryStats, TreeStats};
