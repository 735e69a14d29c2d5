//! VCS port: branch, worktree, and merge primitives.

use crate::task::domain::BranchName;
use crate::workspace::domain::WorkspaceError;
use async_trait::async_trait;
use std::path::Path;

/// Result type for VCS operations.
pub type VcsResult<T> = Result<T, WorkspaceError>;

/// Version-control collaborator contract.
///
/// The production adapter shells out to `git`; tests substitute an
/// in-memory implementation. Exclusively [`crate::workspace`] issues VCS
/// commands; no other component touches this port.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Returns `true` when the trunk checkout has no uncommitted changes.
    async fn trunk_is_clean(&self) -> VcsResult<bool>;

    /// Returns the current trunk head commit id.
    async fn trunk_head(&self) -> VcsResult<String>;

    /// Returns `true` when a local branch with this name exists.
    async fn branch_exists(&self, branch: &BranchName) -> VcsResult<bool>;

    /// Creates `branch` from the trunk head and checks it out as a
    /// worktree at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the branch already exists or the worktree cannot be
    /// created.
    async fn create_worktree(&self, branch: &BranchName, path: &Path) -> VcsResult<()>;

    /// Returns `true` when a worktree checkout exists at `path`.
    async fn worktree_exists(&self, path: &Path) -> VcsResult<bool>;

    /// Moves the worktree's base onto the current trunk head (rebase).
    ///
    /// Implementations abort a conflicted rebase and report the failure;
    /// the caller treats sync as optional.
    async fn rebase_onto_trunk(&self, path: &Path) -> VcsResult<()>;

    /// Returns `true` when the worktree at `path` has uncommitted changes.
    async fn has_uncommitted_changes(&self, path: &Path) -> VcsResult<bool>;

    /// Merges `branch` into trunk with an explicit merge commit and
    /// returns the new trunk commit id.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::MergeConflict`] with the exact
    /// conflicting paths when the merge stops on conflicts; the merge is
    /// aborted and trunk is left as it was. No automatic resolution is
    /// ever attempted.
    async fn merge_into_trunk(
        &self,
        branch: &BranchName,
        message: &str,
        squash: bool,
    ) -> VcsResult<String>;

    /// Removes the worktree at `path`. Removing an absent worktree is a
    /// no-op.
    async fn remove_worktree(&self, path: &Path, force: bool) -> VcsResult<()>;

    /// Deletes `branch`. Deleting an absent branch is a no-op.
    async fn delete_branch(&self, branch: &BranchName) -> VcsResult<()>;
}
