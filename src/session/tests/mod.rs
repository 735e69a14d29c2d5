//! Unit tests for the session context.

mod transcript_tests;
