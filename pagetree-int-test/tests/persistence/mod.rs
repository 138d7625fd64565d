//! Trees stored in page files and reopened.

mod reopen_test;
