//! Distance functions consumed by the trees.
//!
//! Distances are fallible: an error raised while comparing two objects is
//! propagated to the caller of the query or insert that needed it.

mod levenshtein;
mod minkowski;

pub use levenshtein::Levenshtein;
pub use minkowski::{Euclidean, LpNorm, Manhattan, Maximum, SquaredEuclidean};

use crate::errors::{IndexError, IndexResult};
use crate::spatial::Mbr;

/// A (pseudo-)metric over objects of type `O`.
pub trait DistanceFunction<O: ?Sized> {
    fn distance(&self, a: &O, b: &O) -> IndexResult<f64>;
}

/// A distance over vectors that can also bound the distance from a query
/// point to anything inside a rectangle.
pub trait SpatialDistance: DistanceFunction<[f64]> {
    /// Smallest possible distance between `query` and any point in `mbr`.
    fn min_dist(&self, query: &[f64], mbr: &Mbr) -> IndexResult<f64>;
}

/// Adapts a closure into a distance function.
pub struct FnDistance<F>(pub F);

impl<O: ?Sized, F> DistanceFunction<O> for FnDistance<F>
where
    F: Fn(&O, &O) -> IndexResult<f64>,
{
    fn distance(&self, a: &O, b: &O) -> IndexResult<f64> {
        (self.0)(a, b)
    }
}

pub(crate) fn check_dims(expected: usize, actual: usize) -> IndexResult<()> {
    if expected != actual {
        return Err(IndexError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Rejects NaN and negative results.
pub(crate) fn checked(distance: f64) -> IndexResult<f64> {
    if distance.is_nan() || distance < 0.0 {
        return Err(IndexError::Distance(format!(
            "distance function returned {}",
            distance
        )));
    }
    Ok(distance)
}
