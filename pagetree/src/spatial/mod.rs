//! Geometry shared by the spatial trees.

pub mod curve;
pub mod mbr;

pub use curve::SpatialSorter;
pub use mbr::{Mbr, SpatialComparable};
