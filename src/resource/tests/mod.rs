//! Unit tests for the resource context.
