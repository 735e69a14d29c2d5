//! Unit tests for the task context.

mod state_machine_tests;
mod status_graph_tests;
