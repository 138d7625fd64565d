use std::collections::HashSet;

use pagetree::config::TreeConfig;
use pagetree::distance::Euclidean;
use pagetree::errors::IndexResult;
use pagetree::rtree::RStarTree;
use pagetree::types::ObjectId;
use pagetree_int_test::test_util::random_points;

/// Visits every object once, always moving to the nearest unhandled object
/// from the current one.
fn nearest_unhandled_walk(
    tree: &mut RStarTree,
    points: &[(ObjectId, Vec<f64>)],
    start: ObjectId,
) -> IndexResult<Vec<ObjectId>> {
    let mut order = vec![start];
    let mut current = start;
    tree.mark_handled(start, &points[start as usize].1)?;
    loop {
        let next = tree
            .unhandled_priority_search(&points[current as usize].1)?
            .next()
            .transpose()?;
        let Some(next) = next else {
            break;
        };
        assert!(tree.mark_handled(next.id, &points[next.id as usize].1)?);
        order.push(next.id);
        current = next.id;
    }
    Ok(order)
}

#[test]
fn test_walk_visits_every_object_once() -> IndexResult<()> {
    let points = random_points(200, 2, 606);
    let config = TreeConfig::builder().node_capacity(6).build()?;
    let mut tree = RStarTree::in_memory(config, Euclidean)?;
    tree.bulk_load(points.clone())?;

    let order = nearest_unhandled_walk(&mut tree, &points, 17)?;
    assert_eq!(order.len(), 200);
    let distinct: HashSet<ObjectId> = order.iter().copied().collect();
    assert_eq!(distinct.len(), 200);

    let report = tree.check_integrity()?;
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(tree.unhandled_priority_search(&[0.0, 0.0])?.count(), 0);
    Ok(())
}

#[test]
fn test_new_objects_start_unhandled() -> IndexResult<()> {
    let points = random_points(60, 2, 707);
    let config = TreeConfig::builder().node_capacity(4).build()?;
    let mut tree = RStarTree::in_memory(config, Euclidean)?;
    for (id, point) in &points {
        tree.insert(*id, point)?;
    }
    for (id, point) in &points {
        tree.mark_handled(*id, point)?;
    }
    assert_eq!(tree.unhandled_priority_search(&[50.0, 50.0])?.count(), 0);

    // lands inside already handled subtrees
    tree.insert(100, &points[5].1)?;
    tree.insert(101, &[50.0, 50.0])?;
    let remaining: Vec<ObjectId> = tree
        .unhandled_priority_search(&[50.0, 50.0])?
        .map(|r| r.map(|r| r.id))
        .collect::<IndexResult<_>>()?;
    assert_eq!(remaining, vec![101, 100]);
    assert!(tree.check_integrity()?.is_valid);
    Ok(())
}
