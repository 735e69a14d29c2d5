//! Unit tests for the controller context.

mod controller_tests;
