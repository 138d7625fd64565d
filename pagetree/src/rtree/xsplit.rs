//! X-tree directory splits.
//!
//! A directory node is split topologically only if the two halves overlap
//! little. Otherwise the split is retried along an axis every child has
//! already been split on, with a relaxed minimum fanout. When that fails
//! too the node is kept whole and grows into a supernode.

use crate::rtree::entry::{SpatialDirectoryEntry, SplitHistory};
use crate::rtree::split::{prefix_suffix, sorted_on_axis, topological, Partition};
use crate::spatial::mbr::{self, SpatialComparable};

/// Outcome of an X-tree directory split.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum XSplit {
    Split(Partition),
    /// No acceptable split exists; the node becomes a supernode.
    Supernode,
}

/// Parameters of the X-tree split, in entries rather than fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct XSplitter {
    pub max_overlap: f64,
    /// Minimum group size of the overlap-minimal split.
    pub min_fanout: usize,
    /// Regular minimum fill of directory nodes.
    pub directory_minimum: usize,
}

impl XSplitter {
    pub fn new(max_overlap: f64, relative_min_fanout: f64, directory_capacity: usize, directory_minimum: usize) -> Self {
        let min_fanout = ((directory_capacity as f64 * relative_min_fanout).round() as usize).max(2);
        Self {
            max_overlap,
            min_fanout,
            directory_minimum,
        }
    }

    /// Smallest entry count a non-root directory node may hold.
    pub fn lower_bound(&self) -> usize {
        self.min_fanout.min(self.directory_minimum)
    }

    pub fn split(&self, entries: &[SpatialDirectoryEntry]) -> XSplit {
        let n = entries.len();
        let dims = entries.first().map(|e| e.dim()).unwrap_or(0);
        if n < 2 * self.directory_minimum {
            return XSplit::Supernode;
        }

        let axes: Vec<usize> = (0..dims).collect();
        let topo = topological(entries, self.directory_minimum, &axes);
        if topo.overlap_ratio() <= self.max_overlap {
            return XSplit::Split(topo.partition);
        }

        if self.min_fanout < self.directory_minimum && 2 * self.min_fanout <= n {
            let common = SplitHistory::common(entries.iter().map(|e| &e.split_history), dims);
            if let Some((partition, ratio)) = minimum_overlap(entries, self.min_fanout, &common) {
                if ratio <= self.max_overlap {
                    return XSplit::Split(partition);
                }
            }
        }
        XSplit::Supernode
    }
}

/// The distribution with least overlap along any of `axes`, with its
/// overlap ratio.
fn minimum_overlap<E: SpatialComparable>(
    entries: &[E],
    min: usize,
    axes: &[usize],
) -> Option<(Partition, f64)> {
    let n = entries.len();
    let mut best: Option<(f64, f64, Partition)> = None;
    for &axis in axes {
        for by_upper in [false, true] {
            let order = sorted_on_axis(entries, axis, by_upper);
            let (prefix, suffix) = prefix_suffix(entries, &order);
            for k in min..=n - min {
                let (l, r) = (&prefix[k - 1], &suffix[k]);
                let overlap = mbr::overlap(l, r);
                let union = mbr::union_volume(l, r);
                let ratio = if union > 0.0 { overlap / union } else { 0.0 };
                let volume = mbr::volume(l) + mbr::volume(r);
                let better = match &best {
                    None => true,
                    Some((o, v, _)) => ratio < *o || (ratio == *o && volume < *v),
                };
                if better {
                    best = Some((
                        ratio,
                        volume,
                        Partition {
                            left: order[..k].to_vec(),
                            right: order[k..].to_vec(),
                            axis: Some(axis),
                        },
                    ));
                }
            }
        }
    }
    best.map(|(ratio, _, partition)| (partition, ratio))
}
