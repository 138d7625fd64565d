//! Overflow treatment: forced reinsertion before splitting.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::spatial::mbr::{self, Mbr, SpatialComparable};

/// Share of entries reinserted by default.
pub const DEFAULT_REINSERT_FRACTION: f64 = 0.30;

/// Which entries leave an overflowing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReinsertStrategy {
    /// Those farthest from the node's center.
    Far,
    /// Those closest to the node's center.
    Close,
}

/// What happens to an overflowing node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OverflowTreatment {
    Split,
    /// Reinsert a fraction of the entries on the first overflow of a level
    /// per insertion, split otherwise.
    Reinsert {
        strategy: ReinsertStrategy,
        fraction: f64,
    },
}

impl Default for OverflowTreatment {
    fn default() -> Self {
        OverflowTreatment::Reinsert {
            strategy: ReinsertStrategy::Far,
            fraction: DEFAULT_REINSERT_FRACTION,
        }
    }
}

/// Bookkeeping of one top-level insertion.
#[derive(Debug, Default)]
pub(crate) struct InsertState {
    /// Levels that already had their reinsertion.
    treated: HashSet<usize>,
    /// Set while removed entries are being reinserted.
    reinserting: bool,
}

impl InsertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if an overflow at `level` should reinsert rather than split.
    pub fn may_reinsert(&self, level: usize, is_root: bool) -> bool {
        !is_root && !self.reinserting && !self.treated.contains(&level)
    }

    pub fn mark_treated(&mut self, level: usize) {
        self.treated.insert(level);
    }

    pub fn is_reinserting(&self) -> bool {
        self.reinserting
    }

    pub fn set_reinserting(&mut self, reinserting: bool) {
        self.reinserting = reinserting;
    }
}

/// Splits `entries` into those kept and those to reinsert.
///
/// Entries are ranked by the squared distance of their centers to the
/// center of `node_mbr`. At least one entry is reinserted and at least
/// `min_keep` stay. The entries to reinsert come back ordered nearest
/// first.
pub(crate) fn select_reinsert<E: SpatialComparable>(
    entries: Vec<E>,
    node_mbr: &Mbr,
    strategy: ReinsertStrategy,
    fraction: f64,
    min_keep: usize,
) -> (Vec<E>, Vec<E>) {
    let n = entries.len();
    let count = ((n as f64 * fraction).floor() as usize)
        .max(1)
        .min(n.saturating_sub(min_keep));

    let mut ranked: Vec<(f64, E)> = entries
        .into_iter()
        .map(|e| (mbr::center_distance_sq(&e, node_mbr), e))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (keep, reinsert): (Vec<(f64, E)>, Vec<(f64, E)>) = match strategy {
        ReinsertStrategy::Far => {
            let reinsert = ranked.split_off(n - count);
            (ranked, reinsert)
        }
        ReinsertStrategy::Close => {
            let keep = ranked.split_off(count);
            (keep, ranked)
        }
    };
    (
        keep.into_iter().map(|(_, e)| e).collect(),
        reinsert.into_iter().map(|(_, e)| e).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64]).collect()
    }

    #[test]
    fn test_far_reinsert_takes_outermost() {
        let entries = line(11);
        let node = Mbr::union_all(entries.iter()).unwrap();
        let (keep, reinsert) = select_reinsert(entries, &node, ReinsertStrategy::Far, 0.3, 5);
        assert_eq!(keep.len(), 8);
        assert_eq!(reinsert.len(), 3);
        for e in &reinsert {
            assert!(e[0] <= 1.0 || e[0] >= 9.0);
        }
    }

    #[test]
    fn test_close_reinsert_takes_central() {
        let entries = line(11);
        let node = Mbr::union_all(entries.iter()).unwrap();
        let (_, reinsert) = select_reinsert(entries, &node, ReinsertStrategy::Close, 0.3, 5);
        assert_eq!(reinsert[0], vec![5.0]);
        assert!(reinsert.iter().all(|e| (e[0] - 5.0).abs() <= 1.0));
    }

    #[test]
    fn test_reinsert_count_bounds() {
        let entries = line(4);
        let node = Mbr::union_all(entries.iter()).unwrap();
        let (keep, reinsert) = select_reinsert(entries, &node, ReinsertStrategy::Far, 0.1, 3);
        assert_eq!(reinsert.len(), 1);
        assert_eq!(keep.len(), 3);
    }

    #[test]
    fn test_insert_state_levels() {
        let mut state = InsertState::new();
        assert!(state.may_reinsert(0, false));
        assert!(!state.may_reinsert(0, true));
        state.mark_treated(0);
        assert!(!state.may_reinsert(0, false));
        assert!(state.may_reinsert(1, false));
        state.set_reinserting(true);
        assert!(!state.may_reinsert(1, false));
    }
}
