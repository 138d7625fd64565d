use pagetree::config::TreeConfig;
use pagetree::distance::Euclidean;
use pagetree::errors::IndexResult;
use pagetree::rtree::RStarTree;
use pagetree_int_test::test_util::{cleanup, create_test_context, random_points};

fn main() -> IndexResult<()> {
    println!("Starting stress test...");
    let ctx = create_test_context()?;

    let count = 200_000;
    let points = random_points(count, 4, 42);
    let config = TreeConfig::builder().cache_pages(256).build()?;
    let mut tree = RStarTree::create(ctx.path("stress.idx"), config, Euclidean)?;

    let start = std::time::Instant::now();
    for (id, point) in &points {
        tree.insert(*id, point)?;
    }
    let elapsed = start.elapsed();
    println!("Inserted {} points in {:?}", count, elapsed);

    let start = std::time::Instant::now();
    let mut found = 0;
    for (_, point) in points.iter().take(1_000) {
        found += tree.knn_search(point, 10)?.len();
    }
    println!("Answered 1000 10-NN queries ({} results) in {:?}", found, start.elapsed());

    let stats = tree.stats();
    println!(
        "Height {}, {} pages, cache hits {} / misses {}",
        stats.tree_height, stats.allocated_pages, stats.cache_hits, stats.cache_misses
    );

    tree.close()?;
    cleanup(ctx)?;
    println!("Stress test completed.");
    Ok(())
}
