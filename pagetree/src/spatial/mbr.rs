//! Minimum bounding rectangles and the geometry of spatial entries.

use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};

/// Anything with a per-dimension extent: points, rectangles, entries.
pub trait SpatialComparable {
    fn dim(&self) -> usize;

    /// Lower bound in dimension `d`.
    fn min(&self, d: usize) -> f64;

    /// Upper bound in dimension `d`.
    fn max(&self, d: usize) -> f64;

    fn center(&self, d: usize) -> f64 {
        (self.min(d) + self.max(d)) / 2.0
    }

    fn to_mbr(&self) -> Mbr {
        let dim = self.dim();
        Mbr {
            min: (0..dim).map(|d| self.min(d)).collect(),
            max: (0..dim).map(|d| self.max(d)).collect(),
        }
    }
}

impl SpatialComparable for [f64] {
    fn dim(&self) -> usize {
        self.len()
    }

    fn min(&self, d: usize) -> f64 {
        self[d]
    }

    fn max(&self, d: usize) -> f64 {
        self[d]
    }
}

impl SpatialComparable for Vec<f64> {
    fn dim(&self) -> usize {
        self.len()
    }

    fn min(&self, d: usize) -> f64 {
        self[d]
    }

    fn max(&self, d: usize) -> f64 {
        self[d]
    }
}

/// An axis-parallel hyper-rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mbr {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl SpatialComparable for Mbr {
    fn dim(&self) -> usize {
        self.min.len()
    }

    fn min(&self, d: usize) -> f64 {
        self.min[d]
    }

    fn max(&self, d: usize) -> f64 {
        self.max[d]
    }

    fn to_mbr(&self) -> Mbr {
        self.clone()
    }
}

impl Mbr {
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> IndexResult<Self> {
        if min.len() != max.len() {
            return Err(IndexError::DimensionMismatch {
                expected: min.len(),
                actual: max.len(),
            });
        }
        if min.iter().zip(&max).any(|(lo, hi)| !(lo <= hi)) {
            return Err(IndexError::InvalidInput(
                "rectangle has a lower bound above its upper bound".into(),
            ));
        }
        Ok(Self { min, max })
    }

    pub fn from_point(point: &[f64]) -> Self {
        Self {
            min: point.to_vec(),
            max: point.to_vec(),
        }
    }

    /// The rectangle enclosing all `items`; `None` when empty.
    pub fn union_all<'a, E, I>(items: I) -> Option<Mbr>
    where
        E: SpatialComparable + ?Sized + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        let mut iter = items.into_iter();
        let mut mbr = iter.next()?.to_mbr();
        for item in iter {
            mbr.extend(item);
        }
        Some(mbr)
    }

    pub fn extend<E: SpatialComparable + ?Sized>(&mut self, other: &E) {
        for d in 0..self.min.len() {
            self.min[d] = self.min[d].min(other.min(d));
            self.max[d] = self.max[d].max(other.max(d));
        }
    }

    pub fn centroid(&self) -> Vec<f64> {
        (0..self.dim()).map(|d| self.center(d)).collect()
    }
}

/// Product of the extents.
pub fn volume<E: SpatialComparable + ?Sized>(e: &E) -> f64 {
    (0..e.dim()).map(|d| e.max(d) - e.min(d)).product()
}

/// Sum of the extents.
pub fn margin<E: SpatialComparable + ?Sized>(e: &E) -> f64 {
    (0..e.dim()).map(|d| e.max(d) - e.min(d)).sum()
}

pub fn union<A, B>(a: &A, b: &B) -> Mbr
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    let mut mbr = a.to_mbr();
    mbr.extend(b);
    mbr
}

/// Volume of the union rectangle of `a` and `b`.
pub fn union_volume<A, B>(a: &A, b: &B) -> f64
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    (0..a.dim())
        .map(|d| a.max(d).max(b.max(d)) - a.min(d).min(b.min(d)))
        .product()
}

/// How much the volume of `a` grows when extended to cover `b`.
pub fn enlargement<A, B>(a: &A, b: &B) -> f64
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    union_volume(a, b) - volume(a)
}

/// Volume of the intersection, zero when disjoint.
pub fn overlap<A, B>(a: &A, b: &B) -> f64
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    let mut v = 1.0;
    for d in 0..a.dim() {
        let lo = a.min(d).max(b.min(d));
        let hi = a.max(d).min(b.max(d));
        if hi < lo {
            return 0.0;
        }
        v *= hi - lo;
    }
    v
}

pub fn intersects<A, B>(a: &A, b: &B) -> bool
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    (0..a.dim()).all(|d| a.min(d) <= b.max(d) && b.min(d) <= a.max(d))
}

/// True if `outer` contains `inner` (boundaries inclusive).
pub fn contains<A, B>(outer: &A, inner: &B) -> bool
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    (0..outer.dim()).all(|d| outer.min(d) <= inner.min(d) && inner.max(d) <= outer.max(d))
}

/// Squared distance between the centers of `a` and `b`.
pub fn center_distance_sq<A, B>(a: &A, b: &B) -> f64
where
    A: SpatialComparable + ?Sized,
    B: SpatialComparable + ?Sized,
{
    (0..a.dim())
        .map(|d| {
            let diff = a.center(d) - b.center(d);
            diff * diff
        })
        .sum()
}
