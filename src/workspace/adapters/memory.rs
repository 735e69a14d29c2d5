//! In-memory VCS fake for deterministic workspace tests.

use crate::task::domain::BranchName;
use crate::workspace::domain::WorkspaceError;
use crate::workspace::ports::{Vcs, VcsResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct VcsState {
    branches: HashSet<String>,
    worktrees: HashMap<PathBuf, String>,
    dirty_paths: HashSet<PathBuf>,
    trunk_dirty: bool,
    head_serial: u64,
    scripted_conflicts: Vec<PathBuf>,
    merged_branches: Vec<String>,
}

/// Scriptable in-memory VCS.
///
/// Worktrees and branches are plain entries in a map; tests script dirty
/// state and merge conflicts instead of arranging real repository
/// contents.
#[derive(Debug, Default)]
pub struct InMemoryVcs {
    state: Mutex<VcsState>,
}

fn poisoned() -> WorkspaceError {
    WorkspaceError::vcs("in-memory", "state lock poisoned")
}

impl InMemoryVcs {
    /// Creates a fake VCS with a clean trunk and no branches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the trunk checkout dirty.
    pub fn set_trunk_dirty(&self, dirty: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.trunk_dirty = dirty;
        }
    }

    /// Marks a worktree path as holding uncommitted changes.
    pub fn mark_dirty(&self, path: impl Into<PathBuf>) {
        if let Ok(mut state) = self.state.lock() {
            state.dirty_paths.insert(path.into());
        }
    }

    /// Scripts the next merge to stop on these conflicting paths.
    pub fn script_merge_conflict(&self, paths: impl IntoIterator<Item = PathBuf>) {
        if let Ok(mut state) = self.state.lock() {
            state.scripted_conflicts = paths.into_iter().collect();
        }
    }

    /// Pre-creates a branch, simulating a collision.
    pub fn seed_branch(&self, branch: &BranchName) {
        if let Ok(mut state) = self.state.lock() {
            state.branches.insert(branch.as_str().to_owned());
        }
    }

    /// Returns the current branch names, sorted.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkspaceError`] when the state lock was poisoned.
    pub fn branch_list(&self) -> VcsResult<Vec<String>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let mut branches: Vec<String> = state.branches.iter().cloned().collect();
        branches.sort();
        Ok(branches)
    }

    /// Returns the branches merged into trunk, in merge order.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkspaceError`] when the state lock was poisoned.
    pub fn merged_branches(&self) -> VcsResult<Vec<String>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.merged_branches.clone())
    }

    /// Returns the worktree paths currently checked out.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkspaceError`] when the state lock was poisoned.
    pub fn worktree_list(&self) -> VcsResult<Vec<PathBuf>> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let mut paths: Vec<PathBuf> = state.worktrees.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl Vcs for InMemoryVcs {
    async fn trunk_is_clean(&self) -> VcsResult<bool> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(!state.trunk_dirty)
    }

    async fn trunk_head(&self) -> VcsResult<String> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(format!("commit-{}", state.head_serial))
    }

    async fn branch_exists(&self, branch: &BranchName) -> VcsResult<bool> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.branches.contains(branch.as_str()))
    }

    async fn create_worktree(&self, branch: &BranchName, path: &Path) -> VcsResult<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if !state.branches.insert(branch.as_str().to_owned()) {
            return Err(WorkspaceError::vcs("worktree add", "branch already exists"));
        }
        state
            .worktrees
            .insert(path.to_path_buf(), branch.as_str().to_owned());
        Ok(())
    }

    async fn worktree_exists(&self, path: &Path) -> VcsResult<bool> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.worktrees.contains_key(path))
    }

    async fn rebase_onto_trunk(&self, path: &Path) -> VcsResult<()> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        if state.worktrees.contains_key(path) {
            Ok(())
        } else {
            Err(WorkspaceError::vcs("rebase", "no such worktree"))
        }
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> VcsResult<bool> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        Ok(state.dirty_paths.contains(path))
    }

    async fn merge_into_trunk(
        &self,
        branch: &BranchName,
        _message: &str,
        _squash: bool,
    ) -> VcsResult<String> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if !state.scripted_conflicts.is_empty() {
            let paths = std::mem::take(&mut state.scripted_conflicts);
            return Err(WorkspaceError::MergeConflict { paths });
        }
        if !state.branches.contains(branch.as_str()) {
            return Err(WorkspaceError::vcs("merge", "no such branch"));
        }
        state.head_serial += 1;
        state.merged_branches.push(branch.as_str().to_owned());
        Ok(format!("commit-{}", state.head_serial))
    }

    async fn remove_worktree(&self, path: &Path, force: bool) -> VcsResult<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if state.dirty_paths.contains(path) && !force {
            return Err(WorkspaceError::vcs(
                "worktree remove",
                "worktree has modifications",
            ));
        }
        state.worktrees.remove(path);
        state.dirty_paths.remove(path);
        Ok(())
    }

    async fn delete_branch(&self, branch: &BranchName) -> VcsResult<()> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.branches.remove(branch.as_str());
        Ok(())
    }
}
