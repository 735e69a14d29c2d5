//! Domain types for the workspace context.

mod error;
mod workspace;

pub use error::WorkspaceError;
pub use workspace::{MergeOutcome, MergeStrategy, SyncOutcome, Workspace, WorkspaceState};
