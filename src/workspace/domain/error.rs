//! Error types for workspace operations.

use crate::task::domain::BranchName;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by workspace operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    /// The trunk checkout has uncommitted changes; provisioning refuses to
    /// cut a branch from a dirty base.
    #[error("trunk checkout is dirty; commit or stash before provisioning")]
    DirtyTrunk,

    /// The feature branch already exists; it is never silently overwritten.
    #[error("branch {0} already exists")]
    BranchExists(BranchName),

    /// The worktree has uncommitted changes and `force` was not set.
    #[error("workspace at {0} has uncommitted changes; pass force to remove")]
    DirtyWorkspace(PathBuf),

    /// The merge stopped on conflicts; no automatic resolution is
    /// attempted. Paths are reported exactly as the VCS listed them.
    #[error("merge conflict in {} path(s)", paths.len())]
    MergeConflict {
        /// Conflicting paths, verbatim from the VCS.
        paths: Vec<PathBuf>,
    },

    /// The task has no provisioned workspace.
    #[error("no workspace is provisioned for this task")]
    NotProvisioned,

    /// A VCS command failed.
    #[error("vcs failure during {operation}: {detail}")]
    Vcs {
        /// The operation being attempted (e.g., `"worktree add"`).
        operation: String,
        /// Stderr or IO detail from the failed command.
        detail: String,
    },
}

impl WorkspaceError {
    /// Wraps a failed VCS command.
    pub fn vcs(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Vcs {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}
