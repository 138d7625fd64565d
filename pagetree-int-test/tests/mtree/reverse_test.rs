use pagetree::config::MTreeConfig;
use pagetree::distance::Euclidean;
use pagetree::errors::IndexResult;
use pagetree::mtree::MTree;
use pagetree::relation::Relation;
use pagetree::types::ObjectId;
use pagetree_int_test::test_util::{
    assert_same_distances, brute_force_knn, euclidean, random_points, relation_of,
};

/// Ids of the points whose `k`-th nearest neighbor, themselves included,
/// lies no closer than `query`, by (distance, id).
fn brute_force_reverse(points: &[(ObjectId, Vec<f64>)], query: &[f64], k: usize) -> Vec<ObjectId> {
    let mut hits: Vec<(f64, ObjectId)> = points
        .iter()
        .filter_map(|(id, p)| {
            let mut distances: Vec<f64> = points.iter().map(|(_, o)| euclidean(p, o)).collect();
            distances.sort_by(f64::total_cmp);
            let kth = distances.get(k - 1).copied().unwrap_or(f64::INFINITY);
            let d = euclidean(p, query);
            (d <= kth).then_some((d, *id))
        })
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    hits.into_iter().map(|(_, id)| id).collect()
}

#[test]
fn test_reverse_knn_matches_scan() -> IndexResult<()> {
    let points = random_points(300, 3, 77);
    let config = MTreeConfig::builder()
        .node_capacity(6)
        .reverse_knn(5)
        .seed(9)
        .build()?;
    let mut tree = MTree::in_memory(config, relation_of(&points), Euclidean)?;
    tree.bulk_load((0..150).collect())?;
    for id in 150..300 {
        tree.insert(id)?;
    }
    let report = tree.check_integrity()?;
    assert!(report.is_valid, "{:?}", report.errors);

    for query in [vec![50.0, 50.0, 50.0], vec![5.0, 95.0, 40.0]] {
        for k in [1, 3, 5] {
            let (results, stats) = tree.reverse_knn_search_with_stats(&query, k)?;
            let ids: Vec<ObjectId> = results.iter().map(|r| r.id).collect();
            assert_eq!(ids, brute_force_reverse(&points, &query, k), "k = {}", k);
            if k == 5 {
                assert!(stats.pruned_entries > 0);
            }
        }
    }
    Ok(())
}

#[test]
fn test_deleted_objects_leave_the_relation() -> IndexResult<()> {
    let mut points = random_points(200, 2, 41);
    let config = MTreeConfig::builder()
        .node_capacity(4)
        .reverse_knn(3)
        .build()?;
    let mut tree = MTree::in_memory(config, relation_of(&points), Euclidean)?;
    tree.bulk_load((0..200).collect())?;

    // every fourth object, routing objects among them
    for id in (0..200).step_by(4) {
        assert!(tree.delete(id)?);
        assert!(tree.relation_mut().remove(id).is_some());
    }
    points.retain(|(id, _)| id % 4 != 0);
    assert_eq!(tree.relation().size(), 150);
    let report = tree.check_integrity()?;
    assert!(report.is_valid, "{:?}", report.errors);

    let query = vec![60.0, 30.0];
    assert_same_distances(
        &tree.knn_search(&query, 8)?,
        &brute_force_knn(&points, &query, 8),
    );
    let ids: Vec<ObjectId> = tree
        .reverse_knn_search(&query, 3)?
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, brute_force_reverse(&points, &query, 3));
    Ok(())
}
