use pagetree::config::TreeConfig;
use pagetree::distance::Euclidean;
use pagetree::rtree::RStarTree;
use pagetree::types::ObjectId;
use pagetree_int_test::test_util::{
    assert_same_distances, brute_force_knn, cleanup, create_test_context, random_points, run_test,
};

fn ids_at(tree: &RStarTree<Euclidean>, point: &[f64]) -> Vec<ObjectId> {
    match tree.range_search(point, 0.0) {
        Ok(results) => results.iter().map(|r| r.id).collect(),
        Err(e) => panic!("range search failed: {:?}", e),
    }
}

#[test]
fn test_delete_objects_sharing_a_point() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let config = TreeConfig::builder().node_capacity(4).build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            let shared = [5.0, 5.0];
            for (id, point) in random_points(40, 2, 12) {
                tree.insert(id + 100, &point)?;
            }
            for id in 0..12 {
                tree.insert(id, &shared)?;
            }
            assert_eq!(ids_at(&tree, &shared), (0..12).collect::<Vec<_>>());

            for id in 0..6 {
                assert!(tree.delete(id, &shared)?);
                let report = tree.check_integrity()?;
                assert!(report.is_valid, "{:?}", report.errors);
            }
            assert_eq!(ids_at(&tree, &shared), (6..12).collect::<Vec<_>>());
            assert!(!tree.delete(3, &shared)?);
            // right id, wrong point
            assert!(!tree.delete(7, &[5.0, 5.5])?);
            assert_eq!(tree.size(), 46);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_repeated_entry_once_per_call() {
    run_test(
        || create_test_context(),
        |_ctx| {
            let config = TreeConfig::builder().node_capacity(3).build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            for (id, point) in random_points(20, 2, 4) {
                tree.insert(id, &point)?;
            }
            let point = [50.0, 50.0];
            for _ in 0..3 {
                tree.insert(99, &point)?;
            }
            assert_eq!(ids_at(&tree, &point), vec![99, 99, 99]);

            for remaining in (0..3).rev() {
                assert!(tree.delete(99, &point)?);
                assert_eq!(ids_at(&tree, &point).len(), remaining);
                assert!(tree.check_integrity()?.is_valid);
            }
            assert!(!tree.delete(99, &point)?);
            assert_eq!(tree.size(), 20);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_deletes_persist_across_reopen() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.path("deletes.idx");
            let mut points = random_points(300, 2, 31);
            let shared = vec![12.5, 87.5];
            let config = TreeConfig::builder().page_size(512).cache_pages(8).build()?;
            {
                let mut tree = RStarTree::create(&path, config.clone(), Euclidean)?;
                for (id, point) in &points {
                    tree.insert(*id, point)?;
                }
                tree.insert(1000, &shared)?;
                tree.insert(1000, &shared)?;
                tree.insert(1001, &shared)?;
                tree.close()?;
            }

            {
                let mut tree = RStarTree::open(&path, config.clone(), Euclidean)?;
                assert_eq!(tree.size(), 303);
                for (id, point) in points.iter().step_by(3) {
                    assert!(tree.delete(*id, point)?);
                }
                assert!(tree.delete(1000, &shared)?);
                tree.close()?;
            }
            let mut index = 0;
            points.retain(|_| {
                index += 1;
                (index - 1) % 3 != 0
            });

            let mut tree = RStarTree::open(&path, config, Euclidean)?;
            assert_eq!(tree.size(), 202);
            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            assert_eq!(ids_at(&tree, &shared), vec![1000, 1001]);

            let query = vec![40.0, 40.0];
            let mut expected = points.clone();
            expected.push((1000, shared.clone()));
            expected.push((1001, shared.clone()));
            assert_same_distances(
                &tree.knn_search(&query, 12)?,
                &brute_force_knn(&expected, &query, 12),
            );

            // the surviving copy is still deletable after the reopen
            assert!(tree.delete(1000, &shared)?);
            assert!(!tree.delete(1000, &shared)?);
            assert_eq!(tree.size(), 201);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
