//! Metric tree integration tests.

mod metric_test;
mod reverse_test;
