//! Bulk-load partitioning.
//!
//! A bulk split cuts a set of entries into groups that each become one
//! node. The number of groups is the smallest that respects the capacity
//! and group sizes differ by at most one, so every group reaches the
//! minimum fill whenever the input has more entries than one node holds.

use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};
use crate::spatial::mbr::{Mbr, SpatialComparable};
use crate::spatial::SpatialSorter;

/// How entries are grouped into nodes during a bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkSplit {
    /// Input order.
    FileOrder,
    /// Sorted by the center on the first axis.
    OneDimSort,
    /// Recursive halving along the axis of largest extent.
    MaxExtension,
    /// Sort-Tile-Recursive: slabs along each axis in turn.
    SortTileRecursive,
    /// Sort-Tile-Recursive slicing along the axis of largest extent first.
    MaxExtensionSortTileRecursive,
    /// Sorted along a space-filling curve.
    SpatialSort(SpatialSorter),
}

/// Sizes of `ceil(n / max)` groups differing by at most one.
pub fn group_sizes(n: usize, max: usize) -> Vec<usize> {
    if n == 0 || max == 0 {
        return Vec::new();
    }
    let groups = n.div_ceil(max);
    let base = n / groups;
    let extra = n % groups;
    (0..groups).map(|i| base + usize::from(i < extra)).collect()
}

impl BulkSplit {
    /// Partitions `entries` into node-sized groups.
    pub fn partition<E: SpatialComparable>(
        &self,
        entries: Vec<E>,
        min: usize,
        max: usize,
    ) -> IndexResult<Vec<Vec<E>>> {
        let sizes = group_sizes(entries.len(), max);
        if sizes.len() > 1 && sizes.iter().any(|&s| s < min) {
            return Err(IndexError::InvalidConfig(format!(
                "cannot pack {} entries into nodes of {} to {} entries",
                entries.len(),
                min,
                max
            )));
        }
        let dims = entries.first().map(|e| e.dim()).unwrap_or(0);
        let groups = match self {
            BulkSplit::FileOrder => cut(entries, &sizes),
            BulkSplit::OneDimSort => {
                let mut entries = entries;
                if dims > 0 {
                    entries.sort_by(|a, b| a.center(0).total_cmp(&b.center(0)));
                }
                cut(entries, &sizes)
            }
            BulkSplit::SpatialSort(sorter) => cut(sorter.sort(entries), &sizes),
            BulkSplit::MaxExtension => {
                let mut out = Vec::with_capacity(sizes.len());
                max_extension(entries, &sizes, &mut out);
                out
            }
            BulkSplit::SortTileRecursive => {
                let mut out = Vec::with_capacity(sizes.len());
                sort_tile_recursive(entries, &sizes, 0, dims, false, &mut out);
                out
            }
            BulkSplit::MaxExtensionSortTileRecursive => {
                let mut out = Vec::with_capacity(sizes.len());
                sort_tile_recursive(entries, &sizes, 0, dims, true, &mut out);
                out
            }
        };
        Ok(groups)
    }
}

/// Cuts `entries` into consecutive groups of the given sizes.
fn cut<E>(entries: Vec<E>, sizes: &[usize]) -> Vec<Vec<E>> {
    let mut iter = entries.into_iter();
    sizes
        .iter()
        .map(|&size| iter.by_ref().take(size).collect())
        .collect()
}

fn sort_on<E: SpatialComparable>(entries: &mut [E], axis: usize) {
    entries.sort_by(|a, b| a.center(axis).total_cmp(&b.center(axis)));
}

fn largest_extent_axis<E: SpatialComparable>(entries: &[E]) -> usize {
    let Some(bounds) = Mbr::union_all(entries.iter()) else {
        return 0;
    };
    (0..bounds.min.len())
        .max_by(|&a, &b| {
            (bounds.max[a] - bounds.min[a]).total_cmp(&(bounds.max[b] - bounds.min[b]))
        })
        .unwrap_or(0)
}

fn max_extension<E: SpatialComparable>(mut entries: Vec<E>, sizes: &[usize], out: &mut Vec<Vec<E>>) {
    if sizes.len() <= 1 {
        if !entries.is_empty() {
            out.push(entries);
        }
        return;
    }
    let (left_sizes, right_sizes) = sizes.split_at(sizes.len() / 2);
    let left_count: usize = left_sizes.iter().sum();
    let axis = largest_extent_axis(&entries);
    entries.select_nth_unstable_by(left_count, |a, b| a.center(axis).total_cmp(&b.center(axis)));
    let right = entries.split_off(left_count);
    max_extension(entries, left_sizes, out);
    max_extension(right, right_sizes, out);
}

/// Slices `entries` into `ceil(groups^(1/remaining_dims))` slabs along one
/// axis and recurses into each slab with the next axis.
fn sort_tile_recursive<E: SpatialComparable>(
    mut entries: Vec<E>,
    sizes: &[usize],
    depth: usize,
    dims: usize,
    by_extent: bool,
    out: &mut Vec<Vec<E>>,
) {
    if sizes.len() <= 1 || dims == 0 {
        out.extend(cut(entries, sizes));
        return;
    }
    let axis = if by_extent {
        largest_extent_axis(&entries)
    } else {
        depth % dims
    };
    sort_on(&mut entries, axis);

    let remaining_dims = dims.saturating_sub(depth).max(1);
    if remaining_dims == 1 {
        out.extend(cut(entries, sizes));
        return;
    }
    let slabs = (sizes.len() as f64)
        .powf(1.0 / remaining_dims as f64)
        .ceil()
        .max(1.0) as usize;
    let groups_per_slab = sizes.len().div_ceil(slabs);

    let mut iter = entries.into_iter();
    for slab_sizes in sizes.chunks(groups_per_slab) {
        let count: usize = slab_sizes.iter().sum();
        let slab: Vec<E> = iter.by_ref().take(count).collect();
        sort_tile_recursive(slab, slab_sizes, depth + 1, dims, by_extent, out);
    }
}
