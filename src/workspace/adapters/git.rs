//! Git subprocess adapter for the VCS port.

use crate::task::domain::BranchName;
use crate::workspace::domain::WorkspaceError;
use crate::workspace::ports::{Vcs, VcsResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};

/// VCS adapter shelling out to the `git` binary.
///
/// All commands run against one repository: trunk-side commands execute in
/// the trunk checkout, worktree-side commands in the given worktree path.
/// Output is captured, never streamed; these are short-lived plumbing
/// calls.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
    trunk: String,
}

impl GitCli {
    /// Creates an adapter for the repository at `repo_root` whose trunk
    /// branch is `trunk` (e.g., `"main"`).
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, trunk: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            trunk: trunk.into(),
        }
    }

    /// Runs git with `args` in `dir`, returning the raw output.
    async fn run_in(&self, dir: &Path, args: &[&str]) -> VcsResult<Output> {
        debug!(?args, dir = %dir.display(), "git");
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|err| WorkspaceError::vcs(args.join(" "), err.to_string()))
    }

    /// Runs git in `dir` and fails on a non-zero exit with captured stderr.
    async fn run_checked(&self, dir: &Path, args: &[&str]) -> VcsResult<String> {
        let output = self.run_in(dir, args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(WorkspaceError::vcs(args.join(" "), stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    /// Lists the paths left unmerged by a conflicted merge, verbatim.
    async fn conflicting_paths(&self) -> VcsResult<Vec<PathBuf>> {
        let listing = self
            .run_checked(
                &self.repo_root,
                &["diff", "--name-only", "--diff-filter=U"],
            )
            .await?;
        Ok(listing.lines().map(PathBuf::from).collect())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn trunk_is_clean(&self) -> VcsResult<bool> {
        // The trunk checkout must be on the trunk branch for merges to
        // land; a detached or diverged checkout shows up as dirty state in
        // the calling manager's error.
        let status = self
            .run_checked(&self.repo_root, &["status", "--porcelain"])
            .await?;
        Ok(status.is_empty())
    }

    async fn trunk_head(&self) -> VcsResult<String> {
        self.run_checked(&self.repo_root, &["rev-parse", self.trunk.as_str()])
            .await
    }

    async fn branch_exists(&self, branch: &BranchName) -> VcsResult<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self
            .run_in(
                &self.repo_root,
                &["show-ref", "--verify", "--quiet", reference.as_str()],
            )
            .await?;
        Ok(output.status.success())
    }

    async fn create_worktree(&self, branch: &BranchName, path: &Path) -> VcsResult<()> {
        let path_str = path.display().to_string();
        self.run_checked(
            &self.repo_root,
            &[
                "worktree",
                "add",
                path_str.as_str(),
                "-b",
                branch.as_str(),
                self.trunk.as_str(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn worktree_exists(&self, path: &Path) -> VcsResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|err| WorkspaceError::vcs("worktree probe", err.to_string()))
    }

    async fn rebase_onto_trunk(&self, path: &Path) -> VcsResult<()> {
        let output = self.run_in(path, &["rebase", self.trunk.as_str()]).await?;
        if output.status.success() {
            return Ok(());
        }
        // Leave the worktree usable: a conflicted rebase is aborted, never
        // left half-applied for the agent to trip over.
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!(path = %path.display(), "rebase failed, aborting");
        let abort = self.run_in(path, &["rebase", "--abort"]).await?;
        if !abort.status.success() {
            warn!(path = %path.display(), "rebase --abort also failed");
        }
        Err(WorkspaceError::vcs("rebase", stderr))
    }

    async fn has_uncommitted_changes(&self, path: &Path) -> VcsResult<bool> {
        let output = self.run_in(path, &["status", "--porcelain"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(WorkspaceError::vcs("status", stderr));
        }
        Ok(!output.stdout.is_empty())
    }

    async fn merge_into_trunk(
        &self,
        branch: &BranchName,
        message: &str,
        squash: bool,
    ) -> VcsResult<String> {
        let merge_args: Vec<&str> = if squash {
            vec!["merge", "--squash", branch.as_str()]
        } else {
            vec!["merge", "--no-ff", branch.as_str(), "-m", message]
        };
        let output = self.run_in(&self.repo_root, &merge_args).await?;

        if !output.status.success() {
            let paths = self.conflicting_paths().await?;
            let abort = self.run_in(&self.repo_root, &["merge", "--abort"]).await?;
            if !abort.status.success() {
                warn!("merge --abort failed after conflict");
            }
            if paths.is_empty() {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                return Err(WorkspaceError::vcs("merge", stderr));
            }
            return Err(WorkspaceError::MergeConflict { paths });
        }

        if squash {
            // --squash stages the result without committing.
            self.run_checked(&self.repo_root, &["commit", "-m", message])
                .await?;
        }
        self.run_checked(&self.repo_root, &["rev-parse", "HEAD"]).await
    }

    async fn remove_worktree(&self, path: &Path, force: bool) -> VcsResult<()> {
        let path_str = path.display().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(path_str.as_str());
        let output = self.run_in(&self.repo_root, &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Removing an absent worktree is a no-op.
            if !stderr.contains("is not a working tree") {
                return Err(WorkspaceError::vcs("worktree remove", stderr.into_owned()));
            }
        }
        Ok(())
    }

    async fn delete_branch(&self, branch: &BranchName) -> VcsResult<()> {
        let output = self
            .run_in(&self.repo_root, &["branch", "-D", branch.as_str()])
            .await?;
        // Deleting an absent branch is a no-op for idempotent removal.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("not found") {
                return Err(WorkspaceError::vcs("branch -D", stderr.into_owned()));
            }
        }
        Ok(())
    }
}
