//! Port contracts for the workspace context.

pub mod vcs;

pub use vcs::{Vcs, VcsResult};
