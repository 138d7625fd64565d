//! M-tree node splits: promotion of two routing objects, then distribution
//! of the entries between them.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};
use crate::mtree::entry::{enclosing_radius, MetricEntry};
use crate::types::ObjectId;

/// How the two routing objects of a split are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Promotion {
    /// Keep the node's routing object and promote the entry farthest from
    /// it, judged by the stored parent distances.
    MLbDist,
    /// The pair of entries farthest apart.
    FarthestPoints,
    /// The pair minimizing the sum of the two covering radii.
    MRad,
    /// The pair minimizing the larger of the two covering radii.
    MMRad,
    /// A random pair, drawn from the tree's seeded generator.
    Random,
}

/// How entries are assigned to the promoted routing objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    /// Each entry goes to the nearer routing object, then the smaller side
    /// is topped up to the minimum fill.
    GeneralizedHyperplane,
    /// The two sides alternately take their nearest remaining entry.
    Balanced,
}

/// One half of a split.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup<E> {
    pub routing_id: ObjectId,
    /// Parent distances already point at `routing_id`.
    pub entries: Vec<E>,
    pub covering_radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSplit<E> {
    pub first: MetricGroup<E>,
    pub second: MetricGroup<E>,
}

/// A promoted routing object with its distance to every entry.
struct Pivot {
    routing_id: ObjectId,
    /// Index of the entry centered on the routing object.
    anchor: Option<usize>,
    distances: Vec<f64>,
}

/// Entry indices of both sides.
type Assignment = (Vec<usize>, Vec<usize>);

/// Splits `entries` into two groups of at least `min` entries each.
///
/// `routing` is the routing object of the node being split, `None` for
/// the root. `distance` measures two objects by id. Each group's routing
/// object is one of the objects its own entries are centered on.
pub fn split<E, F>(
    entries: Vec<E>,
    routing: Option<ObjectId>,
    promotion: Promotion,
    distribution: Distribution,
    min: usize,
    rng: &mut StdRng,
    distance: F,
) -> IndexResult<MetricSplit<E>>
where
    E: MetricEntry,
    F: Fn(ObjectId, ObjectId) -> IndexResult<f64>,
{
    let n = entries.len();
    if n < 2 || min == 0 || 2 * min > n {
        return Err(IndexError::InvalidSplit(format!(
            "cannot split {} entries into halves of at least {}",
            n, min
        )));
    }

    let pivots = |i: usize, matrix: &[Vec<f64>]| Pivot {
        routing_id: entries[i].object_id(),
        anchor: Some(i),
        distances: matrix[i].clone(),
    };
    let current = routing.and_then(|r| {
        entries
            .iter()
            .position(|e| e.object_id() == r)
            .map(|anchor| (r, anchor))
    });

    let (first, second) = match (promotion, current) {
        (Promotion::MLbDist, Some((routing_id, anchor))) => {
            let far = (0..n)
                .filter(|&i| i != anchor)
                .max_by(|&a, &b| {
                    entries[a]
                        .parent_distance()
                        .total_cmp(&entries[b].parent_distance())
                })
                .ok_or_else(|| IndexError::InvalidSplit("no entry to promote".into()))?;
            let kept = Pivot {
                routing_id,
                anchor: Some(anchor),
                distances: entries.iter().map(|e| e.parent_distance()).collect(),
            };
            let far_id = entries[far].object_id();
            let promoted = Pivot {
                routing_id: far_id,
                anchor: Some(far),
                distances: entries
                    .iter()
                    .map(|e| distance(far_id, e.object_id()))
                    .collect::<IndexResult<_>>()?,
            };
            (kept, promoted)
        }
        // a root, or a node whose routing object moved away, has nothing
        // to keep
        (Promotion::MLbDist, None) | (Promotion::FarthestPoints, _) => {
            let matrix = distance_matrix(&entries, &distance)?;
            let (a, b) = farthest_pair(&matrix);
            (pivots(a, &matrix), pivots(b, &matrix))
        }
        (Promotion::Random, _) => {
            let matrix = distance_matrix(&entries, &distance)?;
            let a = rng.gen_range(0..n);
            let mut b = rng.gen_range(0..n - 1);
            if b >= a {
                b += 1;
            }
            (pivots(a, &matrix), pivots(b, &matrix))
        }
        (Promotion::MRad | Promotion::MMRad, _) => {
            let matrix = distance_matrix(&entries, &distance)?;
            let mut best: Option<((f64, f64), usize, usize)> = None;
            for a in 0..n {
                for b in (a + 1)..n {
                    let (left, right) = distribute(&matrix[a], &matrix[b], distribution, min);
                    let ra = side_radius(&entries, &left, &matrix[a]);
                    let rb = side_radius(&entries, &right, &matrix[b]);
                    let key = match promotion {
                        Promotion::MRad => (ra + rb, ra.max(rb)),
                        _ => (ra.max(rb), ra + rb),
                    };
                    let better = match &best {
                        None => true,
                        Some((k, _, _)) => {
                            key.0.total_cmp(&k.0).then(key.1.total_cmp(&k.1)).is_lt()
                        }
                    };
                    if better {
                        best = Some((key, a, b));
                    }
                }
            }
            let (_, a, b) = best.ok_or_else(|| IndexError::InvalidSplit("no candidate pair".into()))?;
            (pivots(a, &matrix), pivots(b, &matrix))
        }
    };

    let (mut left, mut right) = distribute(&first.distances, &second.distances, distribution, min);
    keep_anchors(&mut left, &mut right, &first, &second);
    if left.len() < min || right.len() < min || left.len() + right.len() != n {
        return Err(IndexError::InvalidSplit(format!(
            "distribution produced {} + {} of {} entries (minimum {})",
            left.len(),
            right.len(),
            n,
            min
        )));
    }
    Ok(assemble(entries, &left, first, second))
}

fn distance_matrix<E, F>(entries: &[E], distance: &F) -> IndexResult<Vec<Vec<f64>>>
where
    E: MetricEntry,
    F: Fn(ObjectId, ObjectId) -> IndexResult<f64>,
{
    let n = entries.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for a in 0..n {
        for b in (a + 1)..n {
            let d = distance(entries[a].object_id(), entries[b].object_id())?;
            matrix[a][b] = d;
            matrix[b][a] = d;
        }
    }
    Ok(matrix)
}

fn farthest_pair(matrix: &[Vec<f64>]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_distance = f64::NEG_INFINITY;
    for a in 0..matrix.len() {
        for b in (a + 1)..matrix.len() {
            if matrix[a][b] > best_distance {
                best_distance = matrix[a][b];
                best = (a, b);
            }
        }
    }
    best
}

/// Covering radius of the entries `side` around a pivot at `distances`.
fn side_radius<E: MetricEntry>(entries: &[E], side: &[usize], distances: &[f64]) -> f64 {
    side.iter()
        .map(|&i| distances[i] + entries[i].radius())
        .fold(0.0, f64::max)
}

/// Assigns every entry to one of two pivots given their distances.
fn distribute(
    first: &[f64],
    second: &[f64],
    distribution: Distribution,
    min: usize,
) -> Assignment {
    let n = first.len();
    match distribution {
        Distribution::GeneralizedHyperplane => {
            let (mut left, mut right): Assignment =
                (0..n).partition(|&i| first[i] <= second[i]);
            // move the entries that mind the move least
            if left.len() < min {
                right.sort_by(|&a, &b| {
                    (first[a] - second[a]).total_cmp(&(first[b] - second[b]))
                });
                let moved: Vec<usize> = right.drain(..min - left.len()).collect();
                left.extend(moved);
            } else if right.len() < min {
                left.sort_by(|&a, &b| {
                    (second[a] - first[a]).total_cmp(&(second[b] - first[b]))
                });
                let moved: Vec<usize> = left.drain(..min - right.len()).collect();
                right.extend(moved);
            }
            left.sort_unstable();
            right.sort_unstable();
            (left, right)
        }
        Distribution::Balanced => {
            let mut by_first: Vec<usize> = (0..n).collect();
            by_first.sort_by(|&a, &b| first[a].total_cmp(&first[b]).then(a.cmp(&b)));
            let mut by_second: Vec<usize> = (0..n).collect();
            by_second.sort_by(|&a, &b| second[a].total_cmp(&second[b]).then(a.cmp(&b)));

            let mut taken = vec![false; n];
            let (mut left, mut right) = (Vec::new(), Vec::new());
            let (mut fi, mut si) = (0, 0);
            let mut assigned = 0;
            while assigned < n {
                while fi < n && taken[by_first[fi]] {
                    fi += 1;
                }
                if fi < n {
                    taken[by_first[fi]] = true;
                    left.push(by_first[fi]);
                    assigned += 1;
                }
                while si < n && taken[by_second[si]] {
                    si += 1;
                }
                if si < n && assigned < n {
                    taken[by_second[si]] = true;
                    right.push(by_second[si]);
                    assigned += 1;
                }
            }
            left.sort_unstable();
            right.sort_unstable();
            (left, right)
        }
    }
}

/// Moves the entry each pivot was promoted from to that pivot's side,
/// trading it for the entry that minds the move least so sizes stay put.
fn keep_anchors(left: &mut [usize], right: &mut [usize], first: &Pivot, second: &Pivot) {
    if let Some(a) = first.anchor {
        if let Some(at) = right.iter().position(|&i| i == a) {
            let partner = second
                .anchor
                .and_then(|b| left.iter().position(|&i| i == b))
                .or_else(|| cheapest(left, |i| second.distances[i] - first.distances[i]));
            if let Some(to) = partner {
                std::mem::swap(&mut left[to], &mut right[at]);
            }
        }
    }
    if let Some(b) = second.anchor {
        if let Some(at) = left.iter().position(|&i| i == b) {
            if let Some(to) = cheapest(right, |i| first.distances[i] - second.distances[i]) {
                std::mem::swap(&mut right[to], &mut left[at]);
            }
        }
    }
}

/// Position in `side` of the entry with the lowest `cost`.
fn cheapest(side: &[usize], cost: impl Fn(usize) -> f64) -> Option<usize> {
    (0..side.len()).min_by(|&a, &b| cost(side[a]).total_cmp(&cost(side[b])))
}

fn assemble<E: MetricEntry>(
    entries: Vec<E>,
    left: &[usize],
    first: Pivot,
    second: Pivot,
) -> MetricSplit<E> {
    let mut in_left = vec![false; entries.len()];
    for &i in left {
        in_left[i] = true;
    }
    let mut first_entries = Vec::new();
    let mut second_entries = Vec::new();
    for (i, mut entry) in entries.into_iter().enumerate() {
        if in_left[i] {
            entry.set_parent_distance(first.distances[i]);
            first_entries.push(entry);
        } else {
            entry.set_parent_distance(second.distances[i]);
            second_entries.push(entry);
        }
    }
    MetricSplit {
        first: MetricGroup {
            routing_id: first.routing_id,
            covering_radius: enclosing_radius(&first_entries),
            entries: first_entries,
        },
        second: MetricGroup {
            routing_id: second.routing_id,
            covering_radius: enclosing_radius(&second_entries),
            entries: second_entries,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtree::entry::{MetricDirectoryEntry, MetricLeafEntry};
    use rand::SeedableRng;

    /// Objects on a line; the id is the position.
    fn line_distance(a: ObjectId, b: ObjectId) -> IndexResult<f64> {
        Ok((a as f64 - b as f64).abs())
    }

    fn leaves(ids: &[ObjectId], routing: ObjectId) -> Vec<MetricLeafEntry> {
        ids.iter()
            .map(|&id| MetricLeafEntry {
                id,
                parent_distance: (id as f64 - routing as f64).abs(),
                knn_distance: 0.0,
            })
            .collect()
    }

    fn all_promotions() -> [Promotion; 5] {
        [
            Promotion::MLbDist,
            Promotion::FarthestPoints,
            Promotion::MRad,
            Promotion::MMRad,
            Promotion::Random,
        ]
    }

    fn sorted_ids(group: &MetricGroup<MetricLeafEntry>) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = group.entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_every_policy_respects_minimum_and_radii() {
        let ids = [0, 1, 2, 3, 10, 11, 12, 13, 30];
        for promotion in all_promotions() {
            for distribution in [Distribution::GeneralizedHyperplane, Distribution::Balanced] {
                let mut rng = StdRng::seed_from_u64(1);
                let result = split(
                    leaves(&ids, 3),
                    Some(3),
                    promotion,
                    distribution,
                    3,
                    &mut rng,
                    line_distance,
                )
                .unwrap();
                for group in [&result.first, &result.second] {
                    assert!(group.entries.len() >= 3, "{:?} {:?}", promotion, distribution);
                    assert!(group.entries.iter().any(|e| e.id == group.routing_id));
                    for e in &group.entries {
                        let d = line_distance(group.routing_id, e.id).unwrap();
                        assert_eq!(e.parent_distance, d);
                        assert!(d <= group.covering_radius);
                    }
                }
                assert_eq!(result.first.entries.len() + result.second.entries.len(), 9);
            }
        }
    }

    #[test]
    fn test_mlb_dist_keeps_routing_object() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(
            leaves(&[0, 1, 2, 20, 21], 1),
            Some(1),
            Promotion::MLbDist,
            Distribution::GeneralizedHyperplane,
            2,
            &mut rng,
            line_distance,
        )
        .unwrap();
        assert_eq!(result.first.routing_id, 1);
        assert_eq!(result.second.routing_id, 21);
        assert_eq!(sorted_ids(&result.first), vec![0, 1, 2]);
        assert_eq!(sorted_ids(&result.second), vec![20, 21]);
        assert_eq!(result.first.covering_radius, 1.0);
    }

    #[test]
    fn test_mm_rad_separates_clusters() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(
            leaves(&[0, 1, 2, 50, 51, 52], 0),
            None,
            Promotion::MMRad,
            Distribution::GeneralizedHyperplane,
            2,
            &mut rng,
            line_distance,
        )
        .unwrap();
        let mut groups = vec![sorted_ids(&result.first), sorted_ids(&result.second)];
        groups.sort();
        assert_eq!(groups, vec![vec![0, 1, 2], vec![50, 51, 52]]);
        assert_eq!(result.first.covering_radius, 1.0);
        assert_eq!(result.second.covering_radius, 1.0);
    }

    #[test]
    fn test_hyperplane_tops_up_small_side() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(
            leaves(&[0, 1, 2, 3, 4, 40], 0),
            None,
            Promotion::FarthestPoints,
            Distribution::GeneralizedHyperplane,
            3,
            &mut rng,
            line_distance,
        )
        .unwrap();
        // 40 alone is too few; the two entries closest to 40 join it
        assert_eq!(sorted_ids(&result.first), vec![0, 1, 2]);
        assert_eq!(sorted_ids(&result.second), vec![3, 4, 40]);
        assert_eq!(result.second.covering_radius, 37.0);
    }

    #[test]
    fn test_directory_radii_include_children() {
        let entries = vec![
            MetricDirectoryEntry {
                page_id: 1,
                routing_id: 0,
                covering_radius: 5.0,
                parent_distance: 0.0,
                knn_distance: 0.0,
            },
            MetricDirectoryEntry {
                page_id: 2,
                routing_id: 2,
                covering_radius: 1.0,
                parent_distance: 2.0,
                knn_distance: 0.0,
            },
            MetricDirectoryEntry {
                page_id: 3,
                routing_id: 100,
                covering_radius: 3.0,
                parent_distance: 100.0,
                knn_distance: 0.0,
            },
            MetricDirectoryEntry {
                page_id: 4,
                routing_id: 104,
                covering_radius: 0.0,
                parent_distance: 104.0,
                knn_distance: 0.0,
            },
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(
            entries,
            None,
            Promotion::FarthestPoints,
            Distribution::GeneralizedHyperplane,
            2,
            &mut rng,
            line_distance,
        )
        .unwrap();
        assert_eq!(result.first.routing_id, 0);
        assert_eq!(result.first.covering_radius, 5.0);
        assert_eq!(result.second.routing_id, 104);
        assert_eq!(result.second.covering_radius, 7.0);
    }

    #[test]
    fn test_routing_objects_stay_with_their_group() {
        // ids 0..4 sit on one spot, so the promoted pair ties with everyone
        let coincident = |a: ObjectId, b: ObjectId| -> IndexResult<f64> {
            let spot = |id: ObjectId| if id < 4 { 0.0 } else { id as f64 };
            Ok((spot(a) - spot(b)).abs())
        };
        for promotion in all_promotions() {
            for distribution in [Distribution::GeneralizedHyperplane, Distribution::Balanced] {
                let mut rng = StdRng::seed_from_u64(3);
                let result = split(
                    leaves(&[0, 1, 2, 3, 9], 0),
                    Some(0),
                    promotion,
                    distribution,
                    2,
                    &mut rng,
                    coincident,
                )
                .unwrap();
                for group in [&result.first, &result.second] {
                    assert!(
                        group.entries.iter().any(|e| e.id == group.routing_id),
                        "{:?} {:?}",
                        promotion,
                        distribution
                    );
                }
            }
        }
    }

    #[test]
    fn test_mlb_dist_without_own_routing_object() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(
            leaves(&[0, 1, 2, 20, 21], 5),
            Some(5),
            Promotion::MLbDist,
            Distribution::GeneralizedHyperplane,
            2,
            &mut rng,
            line_distance,
        )
        .unwrap();
        let mut routing = [result.first.routing_id, result.second.routing_id];
        routing.sort_unstable();
        assert_eq!(routing, [0, 21]);
    }

    #[test]
    fn test_too_few_entries() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(
            leaves(&[0, 1, 2], 0),
            None,
            Promotion::MRad,
            Distribution::Balanced,
            2,
            &mut rng,
            line_distance,
        );
        assert!(matches!(result, Err(IndexError::InvalidSplit(_))));
    }
}
