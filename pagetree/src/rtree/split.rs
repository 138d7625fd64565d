//! Node split strategies for spatial trees.
//!
//! A strategy sees the entries of an overflowing node and partitions them
//! into two groups by index. The partition is validated before any entry is
//! moved: both groups must hold at least `min` entries and together cover
//! every entry exactly once.

use itertools::{Either, Itertools};
use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};
use crate::spatial::mbr::{self, Mbr, SpatialComparable};

/// How an overflowing node is divided in two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// R*-tree split: minimum margin axis, then minimum overlap.
    Topological,
    /// Guttman's quadratic split.
    Quadratic,
    /// Guttman's linear split.
    Linear,
    /// Greene's split: cut in half along the axis separating the seeds.
    Greene,
    /// Ang and Tan's linear split by nearest node border.
    AngTanLinear,
}

/// Two groups of entries, and the axis the cut was made along if the
/// strategy cuts along one.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult<E> {
    pub left: Vec<E>,
    pub right: Vec<E>,
    pub axis: Option<usize>,
}

/// A partition by entry index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Partition {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
    pub axis: Option<usize>,
}

impl SplitStrategy {
    /// Splits `entries` into two groups of at least `min` entries each.
    pub fn split<E: SpatialComparable>(
        &self,
        entries: Vec<E>,
        min: usize,
    ) -> IndexResult<SplitResult<E>> {
        check_splittable(entries.len(), min)?;
        let partition = match self {
            SplitStrategy::Topological => {
                let axes: Vec<usize> = (0..dims_of(&entries)).collect();
                topological(&entries, min, &axes).partition
            }
            SplitStrategy::Quadratic => quadratic(&entries, min),
            SplitStrategy::Linear => linear(&entries, min),
            SplitStrategy::Greene => greene(&entries),
            SplitStrategy::AngTanLinear => ang_tan_linear(&entries, min),
        };
        materialize(entries, partition, min)
    }
}

fn dims_of<E: SpatialComparable>(entries: &[E]) -> usize {
    entries.first().map(|e| e.dim()).unwrap_or(0)
}

fn check_splittable(n: usize, min: usize) -> IndexResult<()> {
    if n < 2 || min == 0 || 2 * min > n {
        return Err(IndexError::InvalidSplit(format!(
            "cannot split {} entries into groups of at least {}",
            n, min
        )));
    }
    Ok(())
}

/// Checks that `partition` covers `0..n` exactly once with both groups in
/// `[min, n - min]`.
pub(crate) fn validate_partition(n: usize, partition: &Partition, min: usize) -> IndexResult<()> {
    let (l, r) = (partition.left.len(), partition.right.len());
    if l == 0 || r == 0 {
        return Err(IndexError::InvalidSplit("split produced an empty group".into()));
    }
    if l + r != n {
        return Err(IndexError::InvalidSplit(format!(
            "split groups of {} and {} entries do not cover {} entries",
            l, r, n
        )));
    }
    if l < min || r < min {
        return Err(IndexError::InvalidSplit(format!(
            "split groups of {} and {} entries violate minimum fill {}",
            l, r, min
        )));
    }
    let mut seen = vec![false; n];
    for &i in partition.left.iter().chain(&partition.right) {
        if i >= n || seen[i] {
            return Err(IndexError::InvalidSplit(format!(
                "entry {} assigned twice or out of range",
                i
            )));
        }
        seen[i] = true;
    }
    Ok(())
}

/// Validates `partition` and moves the entries into their groups.
pub(crate) fn materialize<E>(
    entries: Vec<E>,
    partition: Partition,
    min: usize,
) -> IndexResult<SplitResult<E>> {
    validate_partition(entries.len(), &partition, min)?;
    let mut is_left = vec![false; entries.len()];
    for &i in &partition.left {
        is_left[i] = true;
    }
    let (left, right): (Vec<E>, Vec<E>) = entries
        .into_iter()
        .enumerate()
        .partition_map(|(i, e)| if is_left[i] { Either::Left(e) } else { Either::Right(e) });
    Ok(SplitResult {
        left,
        right,
        axis: partition.axis,
    })
}

// ============================================================================
// Topological (R*) split
// ============================================================================

/// The chosen topological split with its quality measures.
#[derive(Debug, Clone)]
pub(crate) struct TopologicalSplit {
    pub partition: Partition,
    pub overlap: f64,
    pub union_volume: f64,
}

impl TopologicalSplit {
    /// Overlap volume relative to the volume of both groups together.
    pub fn overlap_ratio(&self) -> f64 {
        if self.union_volume > 0.0 {
            self.overlap / self.union_volume
        } else {
            0.0
        }
    }
}

pub(crate) fn sorted_on_axis<E: SpatialComparable>(entries: &[E], axis: usize, by_upper: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        let (ea, eb) = (&entries[a], &entries[b]);
        if by_upper {
            ea.max(axis)
                .total_cmp(&eb.max(axis))
                .then(ea.min(axis).total_cmp(&eb.min(axis)))
        } else {
            ea.min(axis)
                .total_cmp(&eb.min(axis))
                .then(ea.max(axis).total_cmp(&eb.max(axis)))
        }
    });
    order
}

/// `prefix[i]` encloses `order[..=i]`, `suffix[i]` encloses `order[i..]`.
pub(crate) fn prefix_suffix<E: SpatialComparable>(entries: &[E], order: &[usize]) -> (Vec<Mbr>, Vec<Mbr>) {
    let mut prefix: Vec<Mbr> = Vec::with_capacity(order.len());
    for &i in order {
        let next = match prefix.last() {
            Some(prev) => mbr::union(prev, &entries[i]),
            None => entries[i].to_mbr(),
        };
        prefix.push(next);
    }
    let mut suffix: Vec<Mbr> = Vec::with_capacity(order.len());
    for &i in order.iter().rev() {
        let next = match suffix.last() {
            Some(prev) => mbr::union(prev, &entries[i]),
            None => entries[i].to_mbr(),
        };
        suffix.push(next);
    }
    suffix.reverse();
    (prefix, suffix)
}

/// R*-tree split restricted to `axes`, with groups in `[min, n - min]`.
pub(crate) fn topological<E: SpatialComparable>(
    entries: &[E],
    min: usize,
    axes: &[usize],
) -> TopologicalSplit {
    let n = entries.len();

    // axis with minimum margin sum over all distributions
    let mut best_axis = axes.first().copied().unwrap_or(0);
    let mut best_margin = f64::INFINITY;
    for &axis in axes {
        let mut margin_sum = 0.0;
        for by_upper in [false, true] {
            let order = sorted_on_axis(entries, axis, by_upper);
            let (prefix, suffix) = prefix_suffix(entries, &order);
            for k in min..=n - min {
                margin_sum += mbr::margin(&prefix[k - 1]) + mbr::margin(&suffix[k]);
            }
        }
        if margin_sum < best_margin {
            best_margin = margin_sum;
            best_axis = axis;
        }
    }

    // distribution with minimum overlap, ties by total volume
    let mut best: Option<(f64, f64, f64, Vec<usize>, usize)> = None;
    for by_upper in [false, true] {
        let order = sorted_on_axis(entries, best_axis, by_upper);
        let (prefix, suffix) = prefix_suffix(entries, &order);
        for k in min..=n - min {
            let (l, r) = (&prefix[k - 1], &suffix[k]);
            let overlap = mbr::overlap(l, r);
            let volume = mbr::volume(l) + mbr::volume(r);
            let better = match &best {
                None => true,
                Some((o, v, _, _, _)) => overlap < *o || (overlap == *o && volume < *v),
            };
            if better {
                best = Some((overlap, volume, mbr::union_volume(l, r), order.clone(), k));
            }
        }
    }

    match best {
        Some((overlap, _, union_volume, order, k)) => TopologicalSplit {
            partition: Partition {
                left: order[..k].to_vec(),
                right: order[k..].to_vec(),
                axis: Some(best_axis),
            },
            overlap,
            union_volume,
        },
        // no admissible distribution; validation reports it
        None => TopologicalSplit {
            partition: Partition {
                left: (0..n).collect(),
                right: Vec::new(),
                axis: None,
            },
            overlap: 0.0,
            union_volume: 0.0,
        },
    }
}

// ============================================================================
// Guttman splits
// ============================================================================

/// Two growing groups with their bounding rectangles.
struct Groups {
    left: Vec<usize>,
    right: Vec<usize>,
    left_mbr: Mbr,
    right_mbr: Mbr,
}

impl Groups {
    fn new<E: SpatialComparable>(entries: &[E], seed_left: usize, seed_right: usize) -> Self {
        Self {
            left: vec![seed_left],
            right: vec![seed_right],
            left_mbr: entries[seed_left].to_mbr(),
            right_mbr: entries[seed_right].to_mbr(),
        }
    }

    /// Adds entry `i` to the group needing less enlargement; ties go to the
    /// smaller group volume, then to the group with fewer entries.
    fn assign<E: SpatialComparable>(&mut self, entries: &[E], i: usize) {
        let e = &entries[i];
        let dl = mbr::enlargement(&self.left_mbr, e);
        let dr = mbr::enlargement(&self.right_mbr, e);
        let to_left = if dl != dr {
            dl < dr
        } else {
            let (vl, vr) = (mbr::volume(&self.left_mbr), mbr::volume(&self.right_mbr));
            if vl != vr {
                vl < vr
            } else {
                self.left.len() <= self.right.len()
            }
        };
        if to_left {
            self.left.push(i);
            self.left_mbr.extend(e);
        } else {
            self.right.push(i);
            self.right_mbr.extend(e);
        }
    }

    /// Distributes `remaining`, forcing entries into a group that needs them
    /// to reach `min`. `pick` chooses the next entry to assign.
    fn distribute<E, F>(mut self, entries: &[E], mut remaining: Vec<usize>, min: usize, pick: F) -> Partition
    where
        E: SpatialComparable,
        F: Fn(&Groups, &[usize]) -> usize,
    {
        while !remaining.is_empty() {
            if self.left.len() + remaining.len() <= min {
                self.left.append(&mut remaining);
                break;
            }
            if self.right.len() + remaining.len() <= min {
                self.right.append(&mut remaining);
                break;
            }
            let pos = pick(&self, &remaining);
            let i = remaining.swap_remove(pos);
            self.assign(entries, i);
        }
        Partition {
            left: self.left,
            right: self.right,
            axis: None,
        }
    }
}

/// The pair wasting the most volume when put together.
fn quadratic_seeds<E: SpatialComparable>(entries: &[E]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut worst_waste = f64::NEG_INFINITY;
    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            let waste = mbr::union_volume(&entries[i], &entries[j])
                - mbr::volume(&entries[i])
                - mbr::volume(&entries[j]);
            if waste > worst_waste {
                worst_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

fn quadratic<E: SpatialComparable>(entries: &[E], min: usize) -> Partition {
    let (a, b) = quadratic_seeds(entries);
    let remaining: Vec<usize> = (0..entries.len()).filter(|&i| i != a && i != b).collect();
    Groups::new(entries, a, b).distribute(entries, remaining, min, |groups, remaining| {
        // entry with the strongest preference for one group
        let mut best = 0;
        let mut best_diff = f64::NEG_INFINITY;
        for (pos, &i) in remaining.iter().enumerate() {
            let diff = (mbr::enlargement(&groups.left_mbr, &entries[i])
                - mbr::enlargement(&groups.right_mbr, &entries[i]))
            .abs();
            if diff > best_diff {
                best_diff = diff;
                best = pos;
            }
        }
        best
    })
}

fn linear_seeds<E: SpatialComparable>(entries: &[E]) -> (usize, usize) {
    let dims = dims_of(entries);
    let mut best = (0, 1);
    let mut best_separation = f64::NEG_INFINITY;
    for d in 0..dims {
        let mut highest_low = 0;
        let mut lowest_high = 0;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for (i, e) in entries.iter().enumerate() {
            if e.min(d) > entries[highest_low].min(d) {
                highest_low = i;
            }
            if e.max(d) < entries[lowest_high].max(d) {
                lowest_high = i;
            }
            lo = lo.min(e.min(d));
            hi = hi.max(e.max(d));
        }
        let width = hi - lo;
        let separation = if width > 0.0 {
            (entries[highest_low].min(d) - entries[lowest_high].max(d)) / width
        } else {
            0.0
        };
        if separation > best_separation {
            best_separation = separation;
            best = (lowest_high, highest_low);
        }
    }
    if best.0 == best.1 {
        best.1 = if best.0 == 0 { 1 } else { 0 };
    }
    best
}

fn linear<E: SpatialComparable>(entries: &[E], min: usize) -> Partition {
    let (a, b) = linear_seeds(entries);
    let remaining: Vec<usize> = (0..entries.len())
        .rev()
        .filter(|&i| i != a && i != b)
        .collect();
    // remaining is reversed, so taking the last element keeps input order
    Groups::new(entries, a, b).distribute(entries, remaining, min, |_, remaining| {
        remaining.len() - 1
    })
}

fn greene<E: SpatialComparable>(entries: &[E]) -> Partition {
    let (a, b) = quadratic_seeds(entries);
    let dims = dims_of(entries);
    let all = Mbr::union_all(entries.iter());

    let mut axis = 0;
    let mut best_separation = f64::NEG_INFINITY;
    for d in 0..dims {
        let width = all.as_ref().map(|m| m.max[d] - m.min[d]).unwrap_or(0.0);
        let gap = entries[a].min(d).max(entries[b].min(d)) - entries[a].max(d).min(entries[b].max(d));
        let separation = if width > 0.0 { gap / width } else { 0.0 };
        if separation > best_separation {
            best_separation = separation;
            axis = d;
        }
    }

    let order = sorted_on_axis(entries, axis, false);
    let half = entries.len() / 2;
    Partition {
        left: order[..half].to_vec(),
        right: order[half..].to_vec(),
        axis: Some(axis),
    }
}

// ============================================================================
// Ang-Tan linear split
// ============================================================================

fn ang_tan_linear<E: SpatialComparable>(entries: &[E], min: usize) -> Partition {
    let dims = dims_of(entries);
    let Some(all) = Mbr::union_all(entries.iter()) else {
        return Partition {
            left: Vec::new(),
            right: Vec::new(),
            axis: None,
        };
    };

    let mut best: Option<(usize, f64, f64, Vec<usize>, Vec<usize>, usize)> = None;
    for d in 0..dims {
        let (mut low, mut high) = (Vec::new(), Vec::new());
        for (i, e) in entries.iter().enumerate() {
            if e.center(d) - all.min[d] <= all.max[d] - e.center(d) {
                low.push(i);
            } else {
                high.push(i);
            }
        }
        let unevenness = low.len().max(high.len());
        let (overlap, coverage) = match (
            Mbr::union_all(low.iter().map(|&i| &entries[i])),
            Mbr::union_all(high.iter().map(|&i| &entries[i])),
        ) {
            (Some(l), Some(h)) => (mbr::overlap(&l, &h), mbr::volume(&l) + mbr::volume(&h)),
            _ => (0.0, mbr::volume(&all)),
        };
        let better = match &best {
            None => true,
            Some((u, o, c, _, _, _)) => {
                unevenness < *u
                    || (unevenness == *u && (overlap < *o || (overlap == *o && coverage < *c)))
            }
        };
        if better {
            best = Some((unevenness, overlap, coverage, low, high, d));
        }
    }

    let Some((_, _, _, mut low, mut high, axis)) = best else {
        return Partition {
            left: Vec::new(),
            right: Vec::new(),
            axis: None,
        };
    };

    // move the entries nearest to the cut until both sides reach `min`
    let by_center = |a: &usize, b: &usize| entries[*a].center(axis).total_cmp(&entries[*b].center(axis));
    if low.len() < min {
        high.sort_by(by_center);
        let moved: Vec<usize> = high.drain(..min - low.len()).collect();
        low.extend(moved);
    } else if high.len() < min {
        low.sort_by(by_center);
        let keep = low.len() - (min - high.len());
        let moved: Vec<usize> = low.drain(keep..).collect();
        high.extend(moved);
    }

    Partition {
        left: low,
        right: high,
        axis: Some(axis),
    }
}
