//! R*-tree family over point data: the R*-tree itself, the X-tree split
//! policy with supernodes, and handled-marking for density-linked
//! clustering.

mod bulk;
mod check;
pub mod entry;
mod handled;
mod insertion;
mod overflow;
pub mod query;
mod split;
mod tree;
mod xsplit;

pub use bulk::{group_sizes, BulkSplit};
pub use entry::{SpatialDirectoryEntry, SpatialLeafEntry, SpatialNode, SplitHistory};
pub use insertion::{InsertionStrategy, DEFAULT_OVERLAP_CANDIDATES};
pub use overflow::{OverflowTreatment, ReinsertStrategy, DEFAULT_REINSERT_FRACTION};
pub use query::SpatialExpander;
pub use split::{SplitResult, SplitStrategy};
pub use tree::RStarTree;
