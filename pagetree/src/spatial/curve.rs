//! Space-filling curve orderings for bulk loading.
//!
//! Points that are close in space remain relatively close along a Z-order or
//! Hilbert curve, which makes the curves a cheap way to cluster entries into
//! pages. Coordinates are quantized to 32 bits per dimension relative to the
//! bounds of the data being sorted; the curve keys are never materialized as
//! integers, two points are compared by their most significant differing
//! bit instead, so any dimensionality works.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::mbr::SpatialComparable;

/// Bits per dimension used for curve keys
const CURVE_BITS: u32 = 32;

/// Orderings available to the `SpatialSort` bulk split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialSorter {
    /// Bit-interleaved Morton order.
    ZCurve,
    /// Hilbert order in any dimensionality.
    Hilbert,
    /// Recursive median split, cycling through the axes.
    BinarySplit,
}

impl SpatialSorter {
    /// Reorders `items` along the curve. Equal keys keep their input order.
    pub fn sort<E: SpatialComparable>(&self, items: Vec<E>) -> Vec<E> {
        if items.len() < 2 {
            return items;
        }
        match self {
            SpatialSorter::ZCurve => sort_by_keys(items, |q| q),
            SpatialSorter::Hilbert => sort_by_keys(items, hilbert_transpose),
            SpatialSorter::BinarySplit => {
                let mut items = items;
                let dims = items[0].dim();
                binary_split_sort(&mut items, 0, dims);
                items
            }
        }
    }
}

/// Quantizes the centers of `items` onto a `2^32` grid spanning their bounds.
fn quantize<E: SpatialComparable>(items: &[E]) -> Vec<Vec<u32>> {
    let dims = items.first().map(|e| e.dim()).unwrap_or(0);
    let mut lo = vec![f64::INFINITY; dims];
    let mut hi = vec![f64::NEG_INFINITY; dims];
    for item in items {
        for d in 0..dims {
            let c = item.center(d);
            lo[d] = lo[d].min(c);
            hi[d] = hi[d].max(c);
        }
    }
    let scale = u32::MAX as f64;
    items
        .iter()
        .map(|item| {
            (0..dims)
                .map(|d| {
                    let range = hi[d] - lo[d];
                    if range > 0.0 {
                        (((item.center(d) - lo[d]) / range).clamp(0.0, 1.0) * scale) as u32
                    } else {
                        0
                    }
                })
                .collect()
        })
        .collect()
}

fn sort_by_keys<E, F>(items: Vec<E>, transform: F) -> Vec<E>
where
    E: SpatialComparable,
    F: Fn(Vec<u32>) -> Vec<u32>,
{
    let keys: Vec<Vec<u32>> = quantize(&items).into_iter().map(transform).collect();
    let mut keyed: Vec<(Vec<u32>, E)> = keys.into_iter().zip(items).collect();
    keyed.sort_by(|a, b| interleaved_cmp(&a.0, &b.0));
    keyed.into_iter().map(|(_, item)| item).collect()
}

/// True if the most significant bit of `x` is below that of `y`.
fn less_msb(x: u32, y: u32) -> bool {
    x < y && x < (x ^ y)
}

/// Compares the bit-interleavings of two coordinate vectors, dimension 0
/// being most significant within a bit level.
pub fn interleaved_cmp(a: &[u32], b: &[u32]) -> Ordering {
    let mut best_dim = 0;
    let mut best_xor = 0u32;
    for d in 0..a.len() {
        let x = a[d] ^ b[d];
        if less_msb(best_xor, x) {
            best_dim = d;
            best_xor = x;
        }
    }
    if best_xor == 0 {
        return Ordering::Equal;
    }
    a[best_dim].cmp(&b[best_dim])
}

/// Skilling's transform from axes to the transposed Hilbert index.
///
/// The returned vector, read bit-interleaved, is the Hilbert key.
pub fn hilbert_transpose(mut x: Vec<u32>) -> Vec<u32> {
    let n = x.len();
    if n == 0 {
        return x;
    }
    let m: u32 = 1 << (CURVE_BITS - 1);

    // Inverse undo
    let mut q = m;
    while q > 1 {
        let p = q - 1;
        for i in 0..n {
            if x[i] & q != 0 {
                x[0] ^= p;
            } else {
                let t = (x[0] ^ x[i]) & p;
                x[0] ^= t;
                x[i] ^= t;
            }
        }
        q >>= 1;
    }

    // Gray encode
    for i in 1..n {
        x[i] ^= x[i - 1];
    }
    let mut t = 0;
    let mut q = m;
    while q > 1 {
        if x[n - 1] & q != 0 {
            t ^= q - 1;
        }
        q >>= 1;
    }
    for v in x.iter_mut() {
        *v ^= t;
    }
    x
}

fn binary_split_sort<E: SpatialComparable>(items: &mut [E], dim: usize, dims: usize) {
    if items.len() < 2 || dims == 0 {
        return;
    }
    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| a.center(dim).total_cmp(&b.center(dim)));
    let next = (dim + 1) % dims;
    let (left, right) = items.split_at_mut(mid);
    binary_split_sort(left, next, dims);
    binary_split_sort(right, next, dims);
}
