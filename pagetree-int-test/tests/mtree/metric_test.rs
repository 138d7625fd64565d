use pagetree::config::MTreeConfig;
use pagetree::distance::{Euclidean, FnDistance, Levenshtein, Manhattan};
use pagetree::errors::{IndexError, IndexResult};
use pagetree::mtree::{Distribution, MTree, Promotion};
use pagetree::relation::{Relation, VecRelation};
use pagetree::types::ObjectId;
use pagetree_int_test::test_util::{
    assert_same_distances, brute_force_knn, brute_force_range, random_points, relation_of,
};

#[test]
fn test_metric_tree_matches_scan() -> IndexResult<()> {
    let points = random_points(400, 3, 808);
    let query = vec![30.0, 60.0, 90.0];
    for promotion in [Promotion::MMRad, Promotion::MLbDist, Promotion::Random] {
        for distribution in [Distribution::GeneralizedHyperplane, Distribution::Balanced] {
            let config = MTreeConfig::builder()
                .node_capacity(8)
                .promotion(promotion)
                .distribution(distribution)
                .seed(3)
                .build()?;
            let mut tree = MTree::in_memory(config, relation_of(&points), Euclidean)?;
            tree.bulk_load((0..400).collect())?;
            let report = tree.check_integrity()?;
            assert!(report.is_valid, "{:?}: {:?}", promotion, report.errors);

            assert_same_distances(
                &tree.knn_search(&query, 9)?,
                &brute_force_knn(&points, &query, 9),
            );
            assert_same_distances(
                &tree.range_search(&query, 25.0)?,
                &brute_force_range(&points, &query, 25.0),
            );
        }
    }
    Ok(())
}

#[test]
fn test_pruning_saves_distance_computations() -> IndexResult<()> {
    let points = random_points(1000, 2, 809);
    let config = MTreeConfig::builder().node_capacity(10).build()?;
    let mut tree = MTree::in_memory(config, relation_of(&points), Euclidean)?;
    tree.bulk_load((0..1000).collect())?;

    let (results, stats) = tree.range_search_with_stats(&vec![50.0, 50.0], 3.0)?;
    assert_same_distances(&results, &brute_force_range(&points, &[50.0, 50.0], 3.0));
    assert!(stats.distance_computations < 1000);
    assert!(stats.pruned_entries > 0);
    Ok(())
}

#[test]
fn test_mixed_inserts_and_deletes() -> IndexResult<()> {
    let points = random_points(300, 2, 810);
    let config = MTreeConfig::builder().node_capacity(6).build()?;
    let mut tree = MTree::in_memory(config, relation_of(&points), Manhattan)?;
    for id in 0..300 {
        tree.insert(id)?;
        if id >= 50 && id % 5 == 0 {
            assert!(tree.delete(id - 50)?);
        }
    }
    let deleted: Vec<ObjectId> = (0..250).filter(|id| id % 5 == 0).collect();
    assert_eq!(tree.size(), 300 - deleted.len() as u64);
    let report = tree.check_integrity()?;
    assert!(report.is_valid, "{:?}", report.errors);

    let everything = tree.range_search(&vec![50.0, 50.0], 1000.0)?;
    assert_eq!(everything.len() as u64, tree.size());
    assert!(everything.iter().all(|r| !deleted.contains(&r.id)));
    Ok(())
}

#[test]
fn test_custom_metric_over_words() -> IndexResult<()> {
    let words: VecRelation<String> = [
        "cluster", "clusters", "clustering", "density", "dense", "linkage", "link", "links",
        "tree", "trees", "index", "indexing",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect();
    let ids = words.ids();

    let config = MTreeConfig::builder().node_capacity(3).build()?;
    let mut tree = MTree::in_memory(config, words, Levenshtein)?;
    tree.bulk_load(ids)?;
    assert!(tree.check_integrity()?.is_valid);

    let near_link: Vec<ObjectId> = tree
        .range_search(&"link".to_string(), 1.0)?
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(near_link, vec![6, 7]);

    let first = tree.priority_search_by_id(0)?.next().transpose()?;
    assert_eq!(first.map(|r| r.id), Some(0));

    // length difference is a metric on strings too
    let lengths: VecRelation<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
        .iter()
        .map(|w| w.to_string())
        .collect();
    let by_length = FnDistance(|a: &String, b: &String| -> IndexResult<f64> {
        Ok((a.len() as f64 - b.len() as f64).abs())
    });
    let mut tree = MTree::in_memory(MTreeConfig::default(), lengths, by_length)?;
    tree.bulk_load(vec![0, 1, 2, 3, 4])?;
    let nearest = tree.knn_search(&"xyz".to_string(), 1)?;
    assert_eq!(nearest.len(), 1);
    assert_eq!(nearest[0].id, 2);
    Ok(())
}

#[test]
fn test_deleted_object_must_stay_in_relation() -> IndexResult<()> {
    let points = random_points(10, 2, 811);
    let mut tree = MTree::in_memory(MTreeConfig::default(), relation_of(&points), Euclidean)?;
    tree.bulk_load((0..10).collect())?;
    assert!(matches!(tree.delete(10), Err(IndexError::ObjectNotFound(10))));
    assert!(tree.delete(9)?);
    assert!(!tree.delete(9)?);
    Ok(())
}
