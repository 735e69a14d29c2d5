//! Adapter implementations for the workspace context.

mod git;
mod memory;

pub use git::GitCli;
pub use memory::InMemoryVcs;
