use pagetree::config::TreeConfig;
use pagetree::distance::Euclidean;
use pagetree::errors::IndexResult;
use pagetree::rtree::{
    BulkSplit, InsertionStrategy, OverflowTreatment, RStarTree, ReinsertStrategy, SplitStrategy,
};
use pagetree::spatial::SpatialSorter;
use pagetree::types::ObjectId;
use pagetree_int_test::test_util::{
    assert_same_distances, brute_force_knn, brute_force_range, random_points,
};

const QUERIES: [[f64; 2]; 4] = [[0.0, 0.0], [50.0, 50.0], [12.5, 87.5], [100.0, 33.0]];

fn verify(tree: &RStarTree, points: &[(ObjectId, Vec<f64>)], label: &str) -> IndexResult<()> {
    let report = tree.check_integrity()?;
    assert!(report.is_valid, "{}: {:?}", label, report.errors);
    assert_eq!(tree.size(), points.len() as u64, "{}", label);
    for query in QUERIES {
        assert_same_distances(
            &tree.knn_search(&query, 7)?,
            &brute_force_knn(points, &query, 7),
        );
        assert_same_distances(
            &tree.range_search(&query, 15.0)?,
            &brute_force_range(points, &query, 15.0),
        );
    }
    Ok(())
}

#[test]
fn test_every_split_and_insertion_strategy() -> IndexResult<()> {
    let points = random_points(300, 2, 101);
    let splits = [
        SplitStrategy::Topological,
        SplitStrategy::Quadratic,
        SplitStrategy::Linear,
        SplitStrategy::Greene,
        SplitStrategy::AngTanLinear,
    ];
    let insertions = [
        InsertionStrategy::LeastEnlargement,
        InsertionStrategy::LeastOverlap,
        InsertionStrategy::ApproximateLeastOverlap { candidates: 3 },
        InsertionStrategy::Combined,
    ];
    for split in splits {
        for insertion in insertions {
            let config = TreeConfig::builder()
                .node_capacity(6)
                .split_strategy(split)
                .insertion_strategy(insertion)
                .overflow_treatment(OverflowTreatment::Split)
                .build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            for (id, point) in &points {
                tree.insert(*id, point)?;
            }
            verify(&tree, &points, &format!("{:?}/{:?}", split, insertion))?;
        }
    }
    Ok(())
}

#[test]
fn test_reinsert_strategies() -> IndexResult<()> {
    let points = random_points(300, 2, 202);
    for strategy in [ReinsertStrategy::Far, ReinsertStrategy::Close] {
        for fraction in [0.2, 0.3, 0.5] {
            let config = TreeConfig::builder()
                .node_capacity(8)
                .overflow_treatment(OverflowTreatment::Reinsert { strategy, fraction })
                .build()?;
            let mut tree = RStarTree::in_memory(config, Euclidean)?;
            for (id, point) in &points {
                tree.insert(*id, point)?;
            }
            verify(&tree, &points, &format!("{:?} {}", strategy, fraction))?;
        }
    }
    Ok(())
}

#[test]
fn test_every_bulk_split() -> IndexResult<()> {
    let points = random_points(500, 2, 303);
    let bulk_splits = [
        BulkSplit::FileOrder,
        BulkSplit::OneDimSort,
        BulkSplit::MaxExtension,
        BulkSplit::SortTileRecursive,
        BulkSplit::MaxExtensionSortTileRecursive,
        BulkSplit::SpatialSort(SpatialSorter::ZCurve),
        BulkSplit::SpatialSort(SpatialSorter::Hilbert),
        BulkSplit::SpatialSort(SpatialSorter::BinarySplit),
    ];
    for bulk_split in bulk_splits {
        let config = TreeConfig::builder()
            .node_capacity(8)
            .bulk_split(bulk_split)
            .build()?;
        let mut tree = RStarTree::in_memory(config, Euclidean)?;
        tree.bulk_load(points.clone())?;
        verify(&tree, &points, &format!("{:?}", bulk_split))?;

        // the bulk-loaded tree keeps accepting updates
        let extra = random_points(50, 2, 404);
        let mut all = points.clone();
        for (id, point) in extra {
            let id = id + 10_000;
            tree.insert(id, &point)?;
            all.push((id, point));
        }
        for (id, point) in points.iter().take(100) {
            assert!(tree.delete(*id, point)?);
        }
        all.retain(|(id, _)| *id >= 100);
        verify(&tree, &all, &format!("{:?} after updates", bulk_split))?;
    }
    Ok(())
}

#[test]
fn test_priority_search_orders_everything() -> IndexResult<()> {
    let points = random_points(250, 3, 505);
    let config = TreeConfig::builder().node_capacity(5).build()?;
    let mut tree = RStarTree::in_memory(config, Euclidean)?;
    tree.bulk_load(points.clone())?;

    let query = [40.0, 60.0, 20.0];
    let ranked: Vec<_> = tree
        .priority_search(&query)?
        .collect::<IndexResult<Vec<_>>>()?;
    assert_same_distances(&ranked, &brute_force_knn(&points, &query, points.len()));

    let (_, stats) = tree.knn_search_with_stats(&query, 5)?;
    assert!(stats.distance_computations < 250);
    Ok(())
}
