//! Choose-subtree strategies.
//!
//! Before any strategy runs, a child that already contains the new entry
//! is taken (the smallest such child by volume), since inserting there
//! enlarges nothing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::spatial::mbr::{self, Mbr, SpatialComparable};

/// Default candidate count of the approximate least-overlap strategy.
pub const DEFAULT_OVERLAP_CANDIDATES: usize = 32;

/// How the child to descend into is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionStrategy {
    /// Least volume enlargement, ties to the smaller volume.
    LeastEnlargement,
    /// Least overlap enlargement, ties to least volume enlargement, then
    /// to the smaller volume.
    LeastOverlap,
    /// Least overlap among the `candidates` children with least volume
    /// enlargement.
    ApproximateLeastOverlap { candidates: usize },
    /// Least overlap when the children are leaves, least enlargement above.
    Combined,
}

impl InsertionStrategy {
    /// Index of the child of `children` to insert `obj` into.
    ///
    /// `children` must not be empty.
    pub fn choose<C, O>(&self, children: &[C], obj: &O, children_are_leaves: bool) -> usize
    where
        C: SpatialComparable,
        O: SpatialComparable + ?Sized,
    {
        if let Some(i) = smallest_container(children, obj) {
            return i;
        }
        match self {
            InsertionStrategy::LeastEnlargement => least_enlargement(children, obj),
            InsertionStrategy::LeastOverlap => {
                let all: Vec<usize> = (0..children.len()).collect();
                least_overlap(children, obj, &all)
            }
            InsertionStrategy::ApproximateLeastOverlap { candidates } => {
                let mut order: Vec<usize> = (0..children.len()).collect();
                order.sort_by(|&a, &b| {
                    mbr::enlargement(&children[a], obj)
                        .total_cmp(&mbr::enlargement(&children[b], obj))
                        .then(mbr::volume(&children[a]).total_cmp(&mbr::volume(&children[b])))
                });
                order.truncate((*candidates).max(1));
                least_overlap(children, obj, &order)
            }
            InsertionStrategy::Combined => {
                if children_are_leaves {
                    let all: Vec<usize> = (0..children.len()).collect();
                    least_overlap(children, obj, &all)
                } else {
                    least_enlargement(children, obj)
                }
            }
        }
    }
}

fn smallest_container<C, O>(children: &[C], obj: &O) -> Option<usize>
where
    C: SpatialComparable,
    O: SpatialComparable + ?Sized,
{
    children
        .iter()
        .enumerate()
        .filter(|(_, c)| mbr::contains(*c, obj))
        .min_by(|(_, a), (_, b)| mbr::volume(*a).total_cmp(&mbr::volume(*b)))
        .map(|(i, _)| i)
}

fn least_enlargement<C, O>(children: &[C], obj: &O) -> usize
where
    C: SpatialComparable,
    O: SpatialComparable + ?Sized,
{
    let mut best = 0;
    let mut best_key = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let key = (mbr::enlargement(child, obj), mbr::volume(child));
        if lexical_lt(key, best_key) {
            best = i;
            best_key = key;
        }
    }
    best
}

/// Least overlap enlargement among `candidates`, measured against all
/// children.
fn least_overlap<C, O>(children: &[C], obj: &O, candidates: &[usize]) -> usize
where
    C: SpatialComparable,
    O: SpatialComparable + ?Sized,
{
    let mut best = candidates.first().copied().unwrap_or(0);
    let mut best_key = (f64::INFINITY, f64::INFINITY, f64::INFINITY);
    for &i in candidates {
        let enlarged: Mbr = mbr::union(&children[i], obj);
        let mut overlap_delta = 0.0;
        for (j, other) in children.iter().enumerate() {
            if i != j {
                overlap_delta += mbr::overlap(&enlarged, other) - mbr::overlap(&children[i], other);
            }
        }
        let key = (
            overlap_delta,
            mbr::enlargement(&children[i], obj),
            mbr::volume(&children[i]),
        );
        let better = match key.0.total_cmp(&best_key.0) {
            Ordering::Less => true,
            Ordering::Equal => lexical_lt((key.1, key.2), (best_key.1, best_key.2)),
            Ordering::Greater => false,
        };
        if better {
            best = i;
            best_key = key;
        }
    }
    best
}

fn lexical_lt(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)) == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(min: [f64; 2], max: [f64; 2]) -> Mbr {
        Mbr::new(min.to_vec(), max.to_vec()).unwrap()
    }

    #[test]
    fn test_containing_child_wins() {
        let children = vec![rect([0.0, 0.0], [10.0, 10.0]), rect([1.0, 1.0], [3.0, 3.0])];
        let point = [2.0, 2.0];
        for strategy in [
            InsertionStrategy::LeastEnlargement,
            InsertionStrategy::LeastOverlap,
            InsertionStrategy::Combined,
        ] {
            assert_eq!(strategy.choose(&children, &point[..], true), 1);
        }
    }

    #[test]
    fn test_least_enlargement() {
        let children = vec![rect([0.0, 0.0], [1.0, 1.0]), rect([5.0, 5.0], [6.0, 6.0])];
        let point = [4.0, 4.0];
        assert_eq!(
            InsertionStrategy::LeastEnlargement.choose(&children, &point[..], false),
            1
        );
    }

    #[test]
    fn test_least_overlap_avoids_growing_into_neighbours() {
        // growing the first child to reach the point would cover the third
        let children = vec![
            rect([0.0, 0.0], [2.0, 2.0]),
            rect([0.0, 6.0], [1.0, 9.0]),
            rect([3.0, 0.0], [4.0, 1.0]),
        ];
        let point = [5.0, 1.5];
        assert_eq!(
            InsertionStrategy::LeastOverlap.choose(&children, &point[..], true),
            2
        );
        let approximate = InsertionStrategy::ApproximateLeastOverlap { candidates: 3 };
        assert_eq!(approximate.choose(&children, &point[..], true), 2);
    }
}
