//! Lp norms over `f64` vectors.

use super::{check_dims, checked, DistanceFunction, SpatialDistance};
use crate::errors::{IndexError, IndexResult};
use crate::spatial::{Mbr, SpatialComparable};

/// Per-axis gap between `q` and the interval `[lo, hi]`.
fn gap(q: f64, lo: f64, hi: f64) -> f64 {
    if q < lo {
        lo - q
    } else if q > hi {
        q - hi
    } else {
        0.0
    }
}

macro_rules! lp_distance {
    ($name:ty, |$s:ident, $diffs:ident| $combine:expr) => {
        impl $name {
            fn combine<I: Iterator<Item = f64>>(&self, $diffs: I) -> f64 {
                let $s = self;
                $combine
            }
        }

        impl DistanceFunction<[f64]> for $name {
            fn distance(&self, a: &[f64], b: &[f64]) -> IndexResult<f64> {
                check_dims(a.len(), b.len())?;
                checked(self.combine(a.iter().zip(b).map(|(x, y)| (x - y).abs())))
            }
        }

        impl DistanceFunction<Vec<f64>> for $name {
            fn distance(&self, a: &Vec<f64>, b: &Vec<f64>) -> IndexResult<f64> {
                DistanceFunction::<[f64]>::distance(self, a.as_slice(), b.as_slice())
            }
        }

        impl SpatialDistance for $name {
            fn min_dist(&self, query: &[f64], mbr: &Mbr) -> IndexResult<f64> {
                check_dims(mbr.dim(), query.len())?;
                checked(self.combine(
                    (0..query.len()).map(|d| gap(query[d], mbr.min(d), mbr.max(d))),
                ))
            }
        }
    };
}

/// L2 distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Euclidean;

/// Squared L2; orders like [`Euclidean`] without the square root.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SquaredEuclidean;

/// L1 distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Manhattan;

/// L-infinity distance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Maximum;

/// General Lp distance for `p >= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LpNorm {
    p: f64,
}

impl LpNorm {
    pub fn new(p: f64) -> IndexResult<Self> {
        if !(p >= 1.0) || !p.is_finite() {
            return Err(IndexError::InvalidConfig(format!(
                "Lp norm needs finite p >= 1, got {}",
                p
            )));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

lp_distance!(Euclidean, |_s, diffs| diffs.map(|d| d * d).sum::<f64>().sqrt());
lp_distance!(SquaredEuclidean, |_s, diffs| diffs.map(|d| d * d).sum::<f64>());
lp_distance!(Manhattan, |_s, diffs| diffs.sum::<f64>());
lp_distance!(Maximum, |_s, diffs| diffs.fold(0.0, f64::max));
lp_distance!(LpNorm, |s, diffs| diffs
    .map(|d| d.powf(s.p))
    .sum::<f64>()
    .powf(1.0 / s.p));

#[cfg(test)]
mod tests {
    use super::*;

    fn dist<D: DistanceFunction<[f64]>>(d: &D, a: &[f64], b: &[f64]) -> f64 {
        d.distance(a, b).unwrap()
    }

    #[test]
    fn test_norms_on_simple_vectors() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(dist(&Euclidean, &a, &b), 5.0);
        assert_eq!(dist(&SquaredEuclidean, &a, &b), 25.0);
        assert_eq!(dist(&Manhattan, &a, &b), 7.0);
        assert_eq!(dist(&Maximum, &a, &b), 4.0);
        let l2 = LpNorm::new(2.0).unwrap();
        assert!((dist(&l2, &a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_vec_objects_delegate_to_slices() {
        let a = vec![1.0, 1.0];
        let b = vec![2.0, 2.0];
        assert_eq!(Manhattan.distance(&a, &b).unwrap(), 2.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(matches!(
            Euclidean.distance(&[0.0][..], &[1.0, 2.0][..]),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_min_dist_to_rectangle() {
        let mbr = Mbr::new(vec![1.0, 1.0], vec![2.0, 3.0]).unwrap();
        assert_eq!(Euclidean.min_dist(&[1.5, 2.0], &mbr).unwrap(), 0.0);
        assert_eq!(Euclidean.min_dist(&[-2.0, 7.0], &mbr).unwrap(), 5.0);
        assert_eq!(Manhattan.min_dist(&[3.0, 0.0], &mbr).unwrap(), 2.0);
        assert_eq!(Maximum.min_dist(&[3.0, 0.0], &mbr).unwrap(), 1.0);
    }

    #[test]
    fn test_nan_is_a_distance_error() {
        assert!(matches!(
            Euclidean.distance(&[f64::NAN][..], &[0.0][..]),
            Err(IndexError::Distance(_))
        ));
    }

    #[test]
    fn test_lp_norm_rejects_small_p() {
        assert!(LpNorm::new(0.5).is_err());
        assert!(LpNorm::new(f64::NAN).is_err());
    }
}
