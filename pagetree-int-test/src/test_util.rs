use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use pagetree::errors::IndexResult;
use pagetree::relation::VecRelation;
use pagetree::types::{DistanceResult, ObjectId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// Runs a test between its setup and teardown. The teardown runs even when
/// the test fails or panics.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    B: Fn() -> IndexResult<TestContext>,
    T: Fn(TestContext) -> IndexResult<()>,
    A: Fn(TestContext) -> IndexResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| test(ctx.clone())));
    let after_result = after(ctx);
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Test failed: {:?}", e),
        Err(payload) => panic::resume_unwind(payload),
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
}

impl TestContext {
    /// Location of a file named `name` in the test's private directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn create_test_context() -> IndexResult<TestContext> {
    let dir = tempfile::Builder::new().prefix("pagetree-").tempdir()?;
    Ok(TestContext { dir: Arc::new(dir) })
}

/// Removes the files a test left behind. The directory itself goes with
/// the last clone of the context.
pub fn cleanup(ctx: TestContext) -> IndexResult<()> {
    for entry in fs::read_dir(ctx.dir.path())? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// `n` points drawn uniformly from `[0, 100)^dims`, with ids `0..n`.
pub fn random_points(n: usize, dims: usize, seed: u64) -> Vec<(ObjectId, Vec<f64>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n as ObjectId)
        .map(|id| (id, (0..dims).map(|_| rng.gen_range(0.0..100.0)).collect()))
        .collect()
}

/// The points as a relation; ids match because they are dense from 0.
pub fn relation_of(points: &[(ObjectId, Vec<f64>)]) -> VecRelation<Vec<f64>> {
    points.iter().map(|(_, p)| p.clone()).collect()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// The `k` closest points by (distance, id), computed by a full scan.
pub fn brute_force_knn(
    points: &[(ObjectId, Vec<f64>)],
    query: &[f64],
    k: usize,
) -> Vec<DistanceResult> {
    let mut all = scan(points, query);
    all.truncate(k);
    all
}

/// All points within `radius`, by (distance, id), computed by a full scan.
pub fn brute_force_range(
    points: &[(ObjectId, Vec<f64>)],
    query: &[f64],
    radius: f64,
) -> Vec<DistanceResult> {
    scan(points, query)
        .into_iter()
        .take_while(|r| r.distance <= radius)
        .collect()
}

fn scan(points: &[(ObjectId, Vec<f64>)], query: &[f64]) -> Vec<DistanceResult> {
    let mut all: Vec<DistanceResult> = points
        .iter()
        .map(|(id, p)| DistanceResult::new(*id, euclidean(p, query)))
        .collect();
    all.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
    all
}

/// Compares two result lists by distance, allowing for rounding.
pub fn assert_same_distances(actual: &[DistanceResult], expected: &[DistanceResult]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "got {:?}, expected {:?}",
        actual,
        expected
    );
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a.distance - e.distance).abs() < 1e-9,
            "distance {} differs from {}",
            a.distance,
            e.distance
        );
    }
}
