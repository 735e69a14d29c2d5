//! Unit tests for workspace lifecycle orchestration over the in-memory
//! VCS fake.

use crate::task::domain::{BranchName, Task, TaskDomainError, TaskPriority};
use crate::workspace::{
    adapters::InMemoryVcs,
    domain::{MergeStrategy, SyncOutcome, WorkspaceError, WorkspaceState},
    services::WorkspaceManager,
};
use eyre::ensure;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::path::PathBuf;
use std::sync::Arc;

#[fixture]
fn task() -> Result<Task, TaskDomainError> {
    let branch = BranchName::new("task/manager-tests")?;
    Task::new(
        "Manager tests",
        branch,
        TaskPriority::Medium,
        false,
        &DefaultClock,
    )
}

fn manager(vcs: &Arc<InMemoryVcs>) -> WorkspaceManager<InMemoryVcs> {
    WorkspaceManager::new(Arc::clone(vcs), "/tmp/workspaces")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_provisions_branch_and_worktree(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;

    let workspace = manager.create(&task).await?;

    ensure!(workspace.state == WorkspaceState::Active);
    ensure!(workspace.path == manager.path_for(task.id()));
    ensure!(workspace.branch == *task.branch_name());
    ensure!(vcs.branch_list()? == vec!["task/manager-tests".to_owned()]);
    ensure!(vcs.worktree_list()? == vec![workspace.path.clone()]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_refuses_dirty_trunk(task: Result<Task, TaskDomainError>) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    vcs.set_trunk_dirty(true);
    let manager = manager(&vcs);
    let task = task?;

    let result = manager.create(&task).await;

    ensure!(matches!(result, Err(WorkspaceError::DirtyTrunk)));
    ensure!(vcs.branch_list()?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_refuses_existing_branch(task: Result<Task, TaskDomainError>) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    vcs.seed_branch(task.branch_name());

    let result = manager.create(&task).await;

    ensure!(matches!(
        result,
        Err(WorkspaceError::BranchExists(branch)) if branch == *task.branch_name()
    ));
    ensure!(vcs.worktree_list()?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_skips_when_no_worktree_exists(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;

    let outcome = manager.sync(&task).await?;

    ensure!(outcome == SyncOutcome::Skipped);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sync_updates_an_existing_worktree(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    manager.create(&task).await?;

    let outcome = manager.sync(&task).await?;

    ensure!(outcome == SyncOutcome::Updated);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn merge_commits_the_branch_into_trunk(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    manager.create(&task).await?;

    let outcome = manager.merge(&task, MergeStrategy::MergeCommit).await?;

    ensure!(!outcome.merge_commit.is_empty());
    ensure!(outcome.strategy == MergeStrategy::MergeCommit);
    ensure!(vcs.merged_branches()? == vec!["task/manager-tests".to_owned()]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn merge_conflict_reports_paths_verbatim(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    manager.create(&task).await?;
    let conflicts = vec![PathBuf::from("src/lib.rs"), PathBuf::from("README.md")];
    vcs.script_merge_conflict(conflicts.clone());

    let result = manager.merge(&task, MergeStrategy::MergeCommit).await;

    ensure!(matches!(
        result,
        Err(WorkspaceError::MergeConflict { paths }) if paths == conflicts
    ));
    ensure!(vcs.merged_branches()?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remove_refuses_uncommitted_changes_without_force(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    let workspace = manager.create(&task).await?;
    vcs.mark_dirty(workspace.path.clone());

    let result = manager.remove(&task, false).await;

    ensure!(matches!(
        result,
        Err(WorkspaceError::DirtyWorkspace(path)) if path == workspace.path
    ));
    ensure!(vcs.worktree_list()? == vec![workspace.path.clone()]);

    manager.remove(&task, true).await?;
    ensure!(vcs.worktree_list()?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remove_round_trip_restores_branch_list(
    task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    let before = vcs.branch_list()?;

    manager.create(&task).await?;
    manager.remove(&task, false).await?;

    ensure!(vcs.branch_list()? == before);
    ensure!(vcs.worktree_list()?.is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn remove_is_idempotent(task: Result<Task, TaskDomainError>) -> eyre::Result<()> {
    let vcs = Arc::new(InMemoryVcs::new());
    let manager = manager(&vcs);
    let task = task?;
    manager.create(&task).await?;

    manager.remove(&task, false).await?;
    manager.remove(&task, false).await?;

    ensure!(vcs.worktree_list()?.is_empty());
    Ok(())
}
