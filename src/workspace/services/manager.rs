//! Workspace lifecycle orchestration over the VCS port.

use crate::task::domain::{Task, TaskId};
use crate::workspace::domain::{
    MergeOutcome, MergeStrategy, SyncOutcome, Workspace, WorkspaceError,
};
use crate::workspace::ports::Vcs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Provisions, syncs, merges, and removes per-task workspaces.
///
/// Worktree paths derive deterministically from task ids under a single
/// workspaces root. The manager holds no locks across VCS calls: each
/// operation awaits the adapter, so a slow git command on one task never
/// blocks another task's progress.
#[derive(Clone)]
pub struct WorkspaceManager<V>
where
    V: Vcs,
{
    vcs: Arc<V>,
    workspaces_root: PathBuf,
}

impl<V> WorkspaceManager<V>
where
    V: Vcs,
{
    /// Creates a manager placing worktrees under `workspaces_root`.
    #[must_use]
    pub fn new(vcs: Arc<V>, workspaces_root: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            workspaces_root: workspaces_root.into(),
        }
    }

    /// Returns the deterministic worktree path for a task.
    #[must_use]
    pub fn path_for(&self, task_id: TaskId) -> PathBuf {
        self.workspaces_root.join(format!("task-{task_id}"))
    }

    /// Creates the task's isolated worktree and feature branch from the
    /// current trunk head.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::DirtyTrunk`] when the trunk checkout has
    /// uncommitted changes, [`WorkspaceError::BranchExists`] when the
    /// feature branch already exists (it is never overwritten), or a VCS
    /// failure from worktree creation.
    pub async fn create(&self, task: &Task) -> Result<Workspace, WorkspaceError> {
        if !self.vcs.trunk_is_clean().await? {
            return Err(WorkspaceError::DirtyTrunk);
        }
        let branch = task.branch_name();
        if self.vcs.branch_exists(branch).await? {
            return Err(WorkspaceError::BranchExists(branch.clone()));
        }

        let base_commit = self.vcs.trunk_head().await?;
        let path = self.path_for(task.id());
        self.vcs.create_worktree(branch, &path).await?;
        info!(task_id = %task.id(), branch = %branch, path = %path.display(), "workspace created");
        Ok(Workspace::active(path, branch.clone(), base_commit))
    }

    /// Moves the workspace base onto the current trunk head to reduce
    /// future merge divergence.
    ///
    /// Sync is best-effort and safe to skip: a missing worktree or a
    /// conflicted rebase yields [`SyncOutcome::Skipped`], never an error.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkspaceError`] only when the VCS cannot be queried at
    /// all.
    pub async fn sync(&self, task: &Task) -> Result<SyncOutcome, WorkspaceError> {
        let path = self.path_for(task.id());
        if !self.vcs.worktree_exists(&path).await? {
            return Ok(SyncOutcome::Skipped);
        }
        match self.vcs.rebase_onto_trunk(&path).await {
            Ok(()) => Ok(SyncOutcome::Updated),
            Err(err) => {
                warn!(task_id = %task.id(), error = %err, "sync skipped");
                Ok(SyncOutcome::Skipped)
            }
        }
    }

    /// Merges the task's feature branch into trunk.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::MergeConflict`] with the exact list of
    /// conflicting paths when the merge stops on conflicts; automatic
    /// resolution is never attempted. Trunk is left as it was.
    pub async fn merge(
        &self,
        task: &Task,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, WorkspaceError> {
        let branch = task.branch_name();
        let message = format!("Merge {} (task {})", branch, task.id());
        let squash = strategy == MergeStrategy::Squash;
        let merge_commit = self.vcs.merge_into_trunk(branch, &message, squash).await?;
        info!(task_id = %task.id(), %merge_commit, %strategy, "merged");
        Ok(MergeOutcome {
            merge_commit,
            strategy,
        })
    }

    /// Removes the worktree and deletes the feature branch.
    ///
    /// Idempotent: removing an already-removed workspace succeeds as a
    /// no-op (the branch deletion is still attempted).
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::DirtyWorkspace`] when uncommitted changes
    /// exist and `force` is `false`.
    pub async fn remove(&self, task: &Task, force: bool) -> Result<(), WorkspaceError> {
        let path = self.path_for(task.id());
        if self.vcs.worktree_exists(&path).await? {
            if !force && self.vcs.has_uncommitted_changes(&path).await? {
                return Err(WorkspaceError::DirtyWorkspace(path));
            }
            self.vcs.remove_worktree(&path, force).await?;
        }
        self.vcs.delete_branch(task.branch_name()).await?;
        info!(task_id = %task.id(), "workspace removed");
        Ok(())
    }
}
