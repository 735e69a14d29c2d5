//! Unit tests for the workspace context.

mod manager_tests;
