//! M-tree over arbitrary metric objects.
//!
//! The tree indexes object ids of a [`Relation`](crate::relation::Relation)
//! and prunes by the triangle inequality, so any
//! [`DistanceFunction`](crate::distance::DistanceFunction) that is a metric
//! can drive it.

mod check;
pub mod entry;
pub mod query;
pub mod reverse;
pub mod split;
mod tree;

pub use entry::{
    covering_radius, knn_aggregate, MetricDirectoryEntry, MetricEntry, MetricLeafEntry, MetricNode,
};
pub use query::MetricExpander;
pub use reverse::ReverseExpander;
pub use split::{Distribution, MetricGroup, MetricSplit, Promotion};
pub use tree::MTree;
