use pagetree::config::{TreeConfig, TreeVariant};
use pagetree::distance::Euclidean;
use pagetree::errors::IndexResult;
use pagetree::rtree::{OverflowTreatment, RStarTree};
use pagetree_int_test::test_util::{
    assert_same_distances, brute_force_knn, brute_force_range, random_points,
};

fn xtree(max_overlap: f64, treatment: OverflowTreatment) -> IndexResult<RStarTree> {
    let config = TreeConfig::builder()
        .node_capacity(6)
        .overflow_treatment(treatment)
        .variant(TreeVariant::XTree {
            max_overlap,
            min_fanout: 0.3,
        })
        .build()?;
    RStarTree::in_memory(config, Euclidean)
}

#[test]
fn test_xtree_answers_like_a_scan() -> IndexResult<()> {
    let points = random_points(400, 8, 909);
    let query: Vec<f64> = vec![50.0; 8];
    for max_overlap in [0.0, 0.2, 1.0] {
        for treatment in [OverflowTreatment::Split, OverflowTreatment::default()] {
            let mut tree = xtree(max_overlap, treatment)?;
            for (id, point) in &points {
                tree.insert(*id, point)?;
            }
            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{} {:?}: {:?}", max_overlap, treatment, report.errors);

            assert_same_distances(
                &tree.knn_search(&query, 10)?,
                &brute_force_knn(&points, &query, 10),
            );
            assert_same_distances(
                &tree.range_search(&query, 80.0)?,
                &brute_force_range(&points, &query, 80.0),
            );
        }
    }
    Ok(())
}

#[test]
fn test_xtree_survives_deletes() -> IndexResult<()> {
    let mut points = random_points(300, 6, 910);
    let mut tree = xtree(0.0, OverflowTreatment::Split)?;
    for (id, point) in &points {
        tree.insert(*id, point)?;
    }
    for (id, point) in points.iter().filter(|(id, _)| id % 3 != 0) {
        assert!(tree.delete(*id, point)?);
    }
    points.retain(|(id, _)| id % 3 == 0);

    let report = tree.check_integrity()?;
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(tree.size(), points.len() as u64);
    let query = vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
    assert_same_distances(
        &tree.knn_search(&query, 8)?,
        &brute_force_knn(&points, &query, 8),
    );
    Ok(())
}

#[test]
fn test_xtree_bulk_load_then_insert() -> IndexResult<()> {
    let points = random_points(200, 4, 911);
    let config = TreeConfig::builder()
        .node_capacity(5)
        .variant(TreeVariant::xtree())
        .build()?;
    let mut tree = RStarTree::in_memory(config, Euclidean)?;
    tree.bulk_load(points[..150].to_vec())?;
    for (id, point) in &points[150..] {
        tree.insert(*id, point)?;
    }
    assert!(tree.check_integrity()?.is_valid);
    let query = vec![25.0, 75.0, 25.0, 75.0];
    assert_same_distances(
        &tree.knn_search(&query, 12)?,
        &brute_force_knn(&points, &query, 12),
    );
    Ok(())
}
