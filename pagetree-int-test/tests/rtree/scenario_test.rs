use pagetree::config::TreeConfig;
use pagetree::distance::Euclidean;
use pagetree::errors::IndexResult;
use pagetree::rtree::{BulkSplit, OverflowTreatment, RStarTree, ReinsertStrategy};
use pagetree_int_test::test_util::{
    brute_force_knn, cleanup, create_test_context, random_points, run_test,
};

#[test]
fn test_first_split_grows_the_tree() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let config = TreeConfig::builder().node_capacity(3).build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            tree.insert(0, &[0.0, 0.0])?;
            tree.insert(1, &[1.0, 0.0])?;
            tree.insert(2, &[0.0, 1.0])?;
            assert_eq!(tree.height(), 1);

            tree.insert(3, &[5.0, 5.0])?;
            assert_eq!(tree.height(), 2);

            let nearest = tree.knn_search(&[0.0, 0.0], 1)?;
            assert_eq!(nearest.len(), 1);
            assert_eq!(nearest[0].id, 0);
            assert_eq!(nearest[0].distance, 0.0);
            assert!(tree.check_integrity()?.is_valid);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_bulk_load_height_and_fill() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let config = TreeConfig::builder()
                .node_capacity(10)
                .bulk_split(BulkSplit::SortTileRecursive)
                .build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            tree.bulk_load(random_points(1000, 2, 17))?;

            // ceil(log_10(1000 / 10)) + 1
            assert_eq!(tree.height(), 3);
            assert_eq!(tree.size(), 1000);
            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert_eq!(report.entries_checked, 1000);
            // 100 full leaves, 10 directories and the root
            assert_eq!(report.pages_checked, 111);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_zero_radius_range_query() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let config = TreeConfig::builder().node_capacity(4).build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            for (id, point) in random_points(50, 2, 3) {
                tree.insert(id, &point)?;
            }
            tree.insert(50, &[3.0, 4.0])?;

            let hits = tree.range_search(&[3.0, 4.0], 0.0)?;
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].id, 50);
            assert!(tree.range_search(&[3.0, 4.0001], 0.0)?.is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_far_reinsert_keeps_nodes_within_capacity() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let config = TreeConfig::builder()
                .node_capacity(6)
                .overflow_treatment(OverflowTreatment::Reinsert {
                    strategy: ReinsertStrategy::Far,
                    fraction: 0.3,
                })
                .build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            let points = random_points(400, 2, 23);
            for (id, point) in &points {
                tree.insert(*id, point)?;
            }

            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert_eq!(tree.size(), 400);
            for (id, point) in &points {
                let hits = tree.range_search(point, 0.0)?;
                assert!(hits.iter().any(|r| r.id == *id), "object {} lost", id);
            }
            let expected = brute_force_knn(&points, &[50.0, 50.0], 10);
            let actual = tree.knn_search(&[50.0, 50.0], 10)?;
            assert_eq!(
                actual.iter().map(|r| r.id).collect::<Vec<_>>(),
                expected.iter().map(|r| r.id).collect::<Vec<_>>()
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_insert_then_delete_everything() -> IndexResult<()> {
    let config = TreeConfig::builder().node_capacity(5).build()?;
    let mut tree = RStarTree::in_memory(config, Euclidean)?;
    let points = random_points(200, 3, 5);
    for (id, point) in &points {
        tree.insert(*id, point)?;
    }
    for (id, point) in points.iter().rev() {
        assert!(tree.delete(*id, point)?);
        if id % 25 == 0 {
            assert!(tree.check_integrity()?.is_valid);
        }
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert!(tree.knn_search(&[1.0, 1.0, 1.0], 3)?.is_empty());
    Ok(())
}
