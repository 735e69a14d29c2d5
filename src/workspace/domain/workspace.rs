//! Workspace record and merge-related value types.

use crate::task::domain::BranchName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Workspace lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState {
    /// The worktree and branch are being created.
    Provisioning,
    /// The worktree exists and is owned exclusively by its task.
    Active,
    /// The feature branch is being merged into trunk.
    Merging,
    /// The worktree and branch have been removed.
    Removed,
}

/// An isolated, branch-scoped checkout dedicated to one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Worktree path, derived deterministically from the task id.
    pub path: PathBuf,
    /// Feature branch checked out in the worktree.
    pub branch: BranchName,
    /// Trunk commit the branch was cut from.
    pub base_commit: String,
    /// Current lifecycle state.
    pub state: WorkspaceState,
}

impl Workspace {
    /// Creates an active workspace record.
    #[must_use]
    pub fn active(path: impl Into<PathBuf>, branch: BranchName, base_commit: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            branch,
            base_commit: base_commit.into(),
            state: WorkspaceState::Active,
        }
    }

    /// Returns the worktree path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// How a feature branch is folded into trunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// An explicit non-fast-forward merge commit (the default).
    MergeCommit,
    /// Squash the branch into a single trunk commit.
    Squash,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MergeCommit => write!(f, "merge-commit"),
            Self::Squash => write!(f, "squash"),
        }
    }
}

/// Result of a committed merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// The trunk commit created by the merge.
    pub merge_commit: String,
    /// Strategy that produced it.
    pub strategy: MergeStrategy,
}

/// Result of a workspace sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The workspace base was moved onto the current trunk head.
    Updated,
    /// Nothing was done (no workspace, or trunk had not advanced).
    Skipped,
}
