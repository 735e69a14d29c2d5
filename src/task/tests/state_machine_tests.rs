//! Unit tests for compare-and-set transition handling.

use crate::task::{
    adapters::memory::InMemoryTaskRepository,
    domain::{
        BranchName, Phase, SideEffect, StageResult, Task, TaskDomainError, TaskPriority,
        TaskStatus,
    },
    ports::TaskRepository,
    services::{TaskStateMachine, TransitionError, TransitionRequest},
};
use eyre::{bail, ensure};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

type Machine = TaskStateMachine<InMemoryTaskRepository, DefaultClock>;

#[fixture]
fn clock() -> DefaultClock {
    DefaultClock
}

#[fixture]
fn backlog_task(clock: DefaultClock) -> Result<Task, TaskDomainError> {
    let branch = BranchName::new("task/state-machine-tests")?;
    Task::new("State machine tests", branch, TaskPriority::Medium, false, &clock)
}

async fn machine_with(task: &Task) -> eyre::Result<(Machine, InMemoryTaskRepository)> {
    let repo = InMemoryTaskRepository::new();
    repo.create(task).await?;
    let machine = TaskStateMachine::new(Arc::new(repo.clone()), Arc::new(DefaultClock));
    Ok((machine, repo))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn forward_transition_commits_and_emits_effects(
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let task = backlog_task?;
    let (machine, _repo) = machine_with(&task).await?;

    let outcome = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::Analysis,
            "operator",
            TaskStatus::Backlog,
        ))
        .await?;

    ensure!(outcome.new_status == TaskStatus::Analysis);
    ensure!(outcome.effects.contains(&SideEffect::ProvisionWorkspace));
    ensure!(outcome.effects.contains(&SideEffect::SpawnSession(Phase::Analysis)));
    ensure!(outcome.task.stage_results().len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_expectation_returns_conflict_without_audit(
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let task = backlog_task?;
    let (machine, repo) = machine_with(&task).await?;

    let result = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::InProgress,
            "operator",
            TaskStatus::Analysis,
        ))
        .await;

    let Err(TransitionError::ConcurrencyConflict { expected, actual, .. }) = result else {
        bail!("expected concurrency conflict, got {result:?}");
    };
    ensure!(expected == TaskStatus::Analysis);
    ensure!(actual == TaskStatus::Backlog);

    let stored = repo
        .get(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task vanished"))?;
    ensure!(stored.stage_results().is_empty(), "conflict must not mutate");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_edge_is_rejected_with_allowed_list_and_audited(
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let task = backlog_task?;
    let (machine, repo) = machine_with(&task).await?;

    let result = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::Done,
            "operator",
            TaskStatus::Backlog,
        ))
        .await;

    let Err(TransitionError::InvalidTransition { allowed, .. }) = result else {
        bail!("expected invalid transition, got {result:?}");
    };
    ensure!(allowed == vec![
        TaskStatus::Analysis,
        TaskStatus::Blocked,
        TaskStatus::Cancelled
    ]);

    let stored = repo
        .get(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task vanished"))?;
    ensure!(stored.status() == TaskStatus::Backlog);
    ensure!(stored.stage_results().len() == 1, "rejection must be audited");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blocking_without_reason_is_rejected(
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let task = backlog_task?;
    let (machine, _repo) = machine_with(&task).await?;

    let result = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::Blocked,
            "operator",
            TaskStatus::Backlog,
        ))
        .await;

    ensure!(matches!(result, Err(TransitionError::MissingBlockReason)));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blocking_with_reason_succeeds_from_any_working_status(
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let task = backlog_task?;
    let (machine, _repo) = machine_with(&task).await?;

    let outcome = machine
        .request_transition(
            TransitionRequest::new(
                task.id(),
                TaskStatus::Blocked,
                "supervisor",
                TaskStatus::Backlog,
            )
            .with_reason("retry budget exhausted"),
        )
        .await?;

    ensure!(outcome.new_status == TaskStatus::Blocked);
    ensure!(outcome.effects.contains(&SideEffect::ReleaseResources));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn guard_blocks_analysis_exit_until_artifacts_recorded(
    clock: DefaultClock,
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    let task = backlog_task?;
    let (machine, repo) = machine_with(&task).await?;

    machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::Analysis,
            "controller",
            TaskStatus::Backlog,
        ))
        .await?;

    let premature = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::InProgress,
            "controller",
            TaskStatus::Analysis,
        ))
        .await;
    ensure!(matches!(
        premature,
        Err(TransitionError::GuardNotSatisfied { .. })
    ));

    // Record analysis artifacts, then the same edge commits.
    let mut stored = repo
        .get(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task vanished"))?;
    stored.record_stage_result(
        StageResult::success("analysis artifacts recorded", &clock).with_phase(Phase::Analysis),
        &clock,
    );
    repo.update(&stored).await?;

    let outcome = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::InProgress,
            "controller",
            TaskStatus::Analysis,
        ))
        .await?;
    ensure!(outcome.new_status == TaskStatus::InProgress);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn done_requires_a_recorded_merge(
    clock: DefaultClock,
    backlog_task: Result<Task, TaskDomainError>,
) -> eyre::Result<()> {
    use crate::task::domain::merge_details;

    let task = backlog_task?;
    let (machine, repo) = machine_with(&task).await?;

    // Walk the task to code review with guards satisfied.
    let mut stored = repo
        .get(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task vanished"))?;
    stored.record_stage_result(
        StageResult::success("analysis done", &clock).with_phase(Phase::Analysis),
        &clock,
    );
    stored.record_stage_result(
        StageResult::success("tests green", &clock).with_phase(Phase::Testing),
        &clock,
    );
    repo.update(&stored).await?;

    for (target, expected_current) in [
        (TaskStatus::Analysis, TaskStatus::Backlog),
        (TaskStatus::InProgress, TaskStatus::Analysis),
        (TaskStatus::Testing, TaskStatus::InProgress),
        (TaskStatus::CodeReview, TaskStatus::Testing),
    ] {
        machine
            .request_transition(TransitionRequest::new(
                task.id(),
                target,
                "controller",
                expected_current,
            ))
            .await?;
    }

    let premature = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::Done,
            "controller",
            TaskStatus::CodeReview,
        ))
        .await;
    ensure!(matches!(
        premature,
        Err(TransitionError::GuardNotSatisfied { .. })
    ));

    let mut reviewed = repo
        .get(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task vanished"))?;
    reviewed.record_stage_result(
        StageResult::success("merged", &clock)
            .with_details(merge_details("abc123"))
            .with_phase(Phase::Review),
        &clock,
    );
    repo.update(&reviewed).await?;

    let outcome = machine
        .request_transition(TransitionRequest::new(
            task.id(),
            TaskStatus::Done,
            "controller",
            TaskStatus::CodeReview,
        ))
        .await?;
    ensure!(outcome.new_status == TaskStatus::Done);
    ensure!(outcome.effects.contains(&SideEffect::RemoveWorkspace));
    Ok(())
}
