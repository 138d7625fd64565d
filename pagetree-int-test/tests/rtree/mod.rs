//! Spatial tree integration tests: the R*-tree with every strategy, the
//! X-tree, handled-marking and deletion.

mod delete_test;
mod handled_test;
mod scenario_test;
mod strategy_test;
mod xtree_test;
