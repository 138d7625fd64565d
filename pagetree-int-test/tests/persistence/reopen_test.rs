use pagetree::config::{MTreeConfig, TreeConfig, TreeVariant};
use pagetree::distance::Euclidean;
use pagetree::errors::IndexError;
use pagetree::mtree::MTree;
use pagetree::rtree::RStarTree;
use pagetree_int_test::test_util::{
    assert_same_distances, brute_force_knn, cleanup, create_test_context, random_points,
    relation_of, run_test,
};

#[test]
fn test_rtree_survives_reopen_with_small_cache() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.path("points.idx");
            let mut points = random_points(500, 3, 1);
            let config = TreeConfig::builder()
                .page_size(512)
                .cache_pages(4)
                .build()?;
            {
                let mut tree = RStarTree::create(&path, config.clone(), Euclidean)?;
                for (id, point) in &points {
                    tree.insert(*id, point)?;
                }
                let stats = tree.stats();
                assert!(stats.cached_pages <= 4);
                assert!(stats.page_writes > 0);
                tree.close()?;
            }

            let query = vec![20.0, 40.0, 60.0];
            {
                let mut tree = RStarTree::open(&path, config.clone(), Euclidean)?;
                assert_eq!(tree.size(), 500);
                assert_eq!(tree.dimensionality(), 3);
                assert!(tree.check_integrity()?.is_valid);
                assert_same_distances(
                    &tree.knn_search(&query, 10)?,
                    &brute_force_knn(&points, &query, 10),
                );
                assert!(tree.stats().page_reads > 0);

                for (id, point) in points.iter().take(200) {
                    assert!(tree.delete(*id, point)?);
                }
                tree.flush()?;
            }
            points.drain(..200);

            let tree = RStarTree::open(&path, config, Euclidean)?;
            assert_eq!(tree.size(), 300);
            assert!(tree.check_integrity()?.is_valid);
            assert_same_distances(
                &tree.knn_search(&query, 10)?,
                &brute_force_knn(&points, &query, 10),
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_xtree_settings_survive_reopen() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.path("xtree.idx");
            let points = random_points(300, 6, 2);
            let config = TreeConfig::builder()
                .node_capacity(5)
                .variant(TreeVariant::XTree {
                    max_overlap: 0.0,
                    min_fanout: 0.3,
                })
                .build()?;
            {
                let mut tree = RStarTree::create(&path, config.clone(), Euclidean)?;
                tree.bulk_load(points[..100].to_vec())?;
                for (id, point) in &points[100..] {
                    tree.insert(*id, point)?;
                }
                tree.close()?;
            }
            let tree = RStarTree::open(&path, config, Euclidean)?;
            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{:?}", report.errors);
            let query = vec![50.0; 6];
            assert_same_distances(
                &tree.knn_search(&query, 6)?,
                &brute_force_knn(&points, &query, 6),
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_mtree_survives_reopen() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.path("metric.idx");
            let points = random_points(250, 2, 3);
            let config = MTreeConfig::builder()
                .page_size(512)
                .cache_pages(8)
                .build()?;
            {
                let mut tree =
                    MTree::create(&path, config.clone(), relation_of(&points), Euclidean)?;
                tree.bulk_load((0..250).collect())?;
                tree.close()?;
            }
            let tree = MTree::open(&path, config, relation_of(&points), Euclidean)?;
            assert_eq!(tree.size(), 250);
            assert!(tree.check_integrity()?.is_valid);
            let query = vec![75.0, 25.0];
            assert_same_distances(
                &tree.knn_search(&query, 5)?,
                &brute_force_knn(&points, &query, 5),
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_open_checks_the_tree_kind() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.path("metric.idx");
            let points = random_points(20, 2, 4);
            {
                let mut tree = MTree::create(
                    &path,
                    MTreeConfig::default(),
                    relation_of(&points),
                    Euclidean,
                )?;
                tree.bulk_load((0..20).collect())?;
                tree.close()?;
            }
            let result = RStarTree::open(&path, TreeConfig::default(), Euclidean);
            assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
            assert!(matches!(
                RStarTree::open(ctx.path("missing.idx"), TreeConfig::default(), Euclidean),
                Err(IndexError::Io(_))
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
