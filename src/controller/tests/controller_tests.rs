//! Unit tests for mode-aware event handling.

use crate::config::{CommandTemplate, ProjectConfig, RetryBudget};
use crate::controller::events::{PhaseOutcome, SessionEvent, TaskNotification};
use crate::controller::service::{ControllerError, ModeController};
use crate::resource::adapters::FakePortProbe;
use crate::resource::services::ResourceRegistry;
use crate::session::adapters::{ScriptedLauncher, ScriptedRun};
use crate::session::ports::SessionCleanup;
use crate::session::services::SessionSupervisor;
use crate::task::adapters::memory::InMemoryTaskRepository;
use crate::task::domain::{
    BranchName, EventId, Phase, SessionId, StageResult, StageStatus, Task, TaskId, TaskPriority,
    TaskStatus,
};
use crate::task::ports::{TaskFilter, TaskRepository, TaskRepositoryError, TaskRepositoryResult};
use crate::task::services::{TaskStateMachine, TransitionError};
use crate::workspace::adapters::InMemoryVcs;
use crate::workspace::services::WorkspaceManager;
use async_trait::async_trait;
use eyre::{ensure, eyre};
use mockable::DefaultClock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type TestController = ModeController<
    InMemoryTaskRepository,
    InMemoryVcs,
    ScriptedLauncher,
    FakePortProbe,
    DefaultClock,
>;

struct Harness {
    controller: TestController,
    repository: Arc<InMemoryTaskRepository>,
    vcs: Arc<InMemoryVcs>,
    launcher: Arc<ScriptedLauncher>,
    registry: Arc<ResourceRegistry<FakePortProbe, DefaultClock>>,
    config: ProjectConfig,
}

fn test_config() -> ProjectConfig {
    let mut config = ProjectConfig {
        session_timeout: Duration::from_secs(5),
        grace_period: Duration::from_millis(100),
        marker_poll_interval: Duration::from_millis(10),
        retry: RetryBudget::new(2, Duration::from_millis(5)),
        workspaces_root: PathBuf::from("/tmp/brunel-workspaces"),
        ..ProjectConfig::default()
    };
    for phase in [
        Phase::Analysis,
        Phase::Implementation,
        Phase::Testing,
        Phase::Review,
    ] {
        config
            .phase_commands
            .insert(phase, CommandTemplate::new("agent", ["--phase", "{{ phase }}"]));
    }
    config
}

fn harness() -> Harness {
    let config = test_config();
    let clock = Arc::new(DefaultClock);
    let repository = Arc::new(InMemoryTaskRepository::new());
    let vcs = Arc::new(InMemoryVcs::new());
    let launcher = Arc::new(ScriptedLauncher::new());
    let registry = Arc::new(ResourceRegistry::new(
        Arc::new(FakePortProbe::new()),
        Arc::clone(&clock),
    ));
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let supervisor = SessionSupervisor::new(
        Arc::clone(&launcher),
        Arc::clone(&clock),
        Arc::new(config.clone()),
        Arc::clone(&registry) as Arc<dyn SessionCleanup>,
        events_tx,
    );
    let state_machine = Arc::new(TaskStateMachine::new(
        Arc::clone(&repository),
        Arc::clone(&clock),
    ));
    let controller = ModeController::new(
        state_machine,
        Arc::clone(&repository),
        Arc::new(WorkspaceManager::new(
            Arc::clone(&vcs),
            config.workspaces_root.clone(),
        )),
        Arc::clone(&registry),
        supervisor,
        clock,
    );
    Harness {
        controller,
        repository,
        vcs,
        launcher,
        registry,
        config,
    }
}

impl Harness {
    /// Seeds a task directly into `status`, recording the stage results a
    /// task in that status would already carry.
    async fn seed_task(
        &self,
        status: TaskStatus,
        manual_mode: bool,
    ) -> eyre::Result<Task> {
        let clock = DefaultClock;
        let branch = BranchName::new("task/controller-tests")?;
        let mut task = Task::new(
            "Controller tests",
            branch,
            TaskPriority::Medium,
            manual_mode,
            &clock,
        )?;
        if !matches!(status, TaskStatus::Backlog | TaskStatus::Analysis) {
            task.record_stage_result(
                StageResult::success("analysis phase completed", &clock)
                    .with_phase(Phase::Analysis),
                &clock,
            );
        }
        if matches!(status, TaskStatus::CodeReview) {
            task.record_stage_result(
                StageResult::success("testing phase completed", &clock)
                    .with_phase(Phase::Testing),
                &clock,
            );
        }
        task.force_status(status);
        self.repository.create(&task).await?;
        Ok(task)
    }

    async fn stored(&self, task_id: TaskId) -> eyre::Result<Task> {
        self.repository
            .get(task_id)
            .await?
            .ok_or_else(|| eyre!("task vanished"))
    }
}

/// Polls until the probe holds; session monitors launch asynchronously, so
/// launch counters must be awaited rather than asserted directly.
async fn wait_until(mut probe: impl FnMut() -> bool) -> eyre::Result<()> {
    for _ in 0..200 {
        if probe() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Err(eyre!("condition not reached in time"))
}

/// Repository whose status commits always lose to a phantom concurrent
/// writer; everything else delegates to the in-memory store.
#[derive(Debug, Clone)]
struct ContestedRepository {
    inner: Arc<InMemoryTaskRepository>,
}

#[async_trait]
impl TaskRepository for ContestedRepository {
    async fn create(&self, task: &Task) -> TaskRepositoryResult<()> {
        self.inner.create(task).await
    }

    async fn get(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: TaskFilter) -> TaskRepositoryResult<Vec<Task>> {
        self.inner.list(filter).await
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        self.inner.update(task).await
    }

    async fn compare_and_swap_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        _new_status: TaskStatus,
        _audit: StageResult,
    ) -> TaskRepositoryResult<Task> {
        Err(TaskRepositoryError::StatusConflict {
            task_id: id,
            expected,
            actual: TaskStatus::Blocked,
        })
    }
}

fn event(task: &Task, phase: Phase, outcome: PhaseOutcome) -> SessionEvent {
    SessionEvent {
        event_id: EventId::new(),
        session_id: SessionId::new(),
        task_id: task.id(),
        phase,
        outcome,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn starting_a_backlog_task_provisions_and_spawns() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Backlog, false).await?;
    harness.launcher.push_run(ScriptedRun::hanging(["analysing"]));

    harness.controller.start_task(task.id()).await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Analysis);
    ensure!(stored.workspace_path().is_some());
    ensure!(stored.active_session().is_some());
    let launcher = Arc::clone(&harness.launcher);
    wait_until(move || launcher.launches() == 1).await?;
    ensure!(harness.vcs.branch_list()? == vec!["task/controller-tests".to_owned()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_events_are_dropped() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Analysis, false).await?;
    harness.launcher.push_run(ScriptedRun::hanging(["implementing"]));

    let success = event(&task, Phase::Analysis, PhaseOutcome::Succeeded);
    harness.controller.handle_event(success.clone()).await?;
    harness.controller.handle_event(success).await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::InProgress);
    let launcher = Arc::clone(&harness.launcher);
    wait_until(move || launcher.launches() == 1).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_mode_records_the_outcome_and_halts() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Analysis, true).await?;

    harness
        .controller
        .handle_event(event(&task, Phase::Analysis, PhaseOutcome::Succeeded))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Analysis);
    ensure!(stored.has_successful_stage(Phase::Analysis));
    ensure!(harness.launcher.launches() == 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn phase_failure_steps_backward_with_the_reason() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Testing, false).await?;
    harness.launcher.push_run(ScriptedRun::hanging(["implementing"]));

    harness
        .controller
        .handle_event(event(
            &task,
            Phase::Testing,
            PhaseOutcome::Failed {
                reason: "3 tests failing".to_owned(),
            },
        ))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::InProgress);
    let reasons: Vec<String> = stored
        .stage_results()
        .iter()
        .filter_map(|entry| entry.details.get("reason"))
        .filter_map(|value| value.as_str().map(ToOwned::to_owned))
        .collect();
    ensure!(reasons.contains(&"3 tests failing".to_owned()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn terminal_session_failure_blocks_and_releases_leases() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::InProgress, false).await?;
    harness
        .registry
        .allocate_port(task.id(), harness.config.ports, None)?;

    harness
        .controller
        .handle_event(event(
            &task,
            Phase::Implementation,
            PhaseOutcome::Crashed {
                reason: "retry budget exhausted after 2 attempts".to_owned(),
            },
        ))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Blocked);
    ensure!(harness.registry.leases(task.id())?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn approved_review_merges_and_completes_the_task() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::CodeReview, false).await?;
    harness.vcs.seed_branch(task.branch_name());

    harness
        .controller
        .handle_event(event(&task, Phase::Review, PhaseOutcome::Succeeded))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Done);
    ensure!(stored.has_merge_result());
    ensure!(stored.workspace_path().is_none());
    ensure!(
        harness.vcs.merged_branches()? == vec!["task/controller-tests".to_owned()]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_conflict_keeps_the_task_in_review() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::CodeReview, false).await?;
    harness.vcs.seed_branch(task.branch_name());
    let conflicts = vec![PathBuf::from("src/lib.rs"), PathBuf::from("Cargo.toml")];
    harness.vcs.script_merge_conflict(conflicts.clone());

    harness
        .controller
        .handle_event(event(&task, Phase::Review, PhaseOutcome::Succeeded))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::CodeReview);
    let recorded: Vec<String> = stored
        .stage_results()
        .iter()
        .filter_map(|entry| entry.details.get("conflicts"))
        .filter_map(|value| value.as_array().cloned())
        .flatten()
        .filter_map(|value| value.as_str().map(ToOwned::to_owned))
        .collect();
    ensure!(recorded == vec!["src/lib.rs".to_owned(), "Cargo.toml".to_owned()]);
    ensure!(harness.vcs.merged_branches()?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn transitions_from_terminal_statuses_are_rejected() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Done, false).await?;

    let result = harness.controller.start_task(task.id()).await;

    ensure!(matches!(
        result,
        Err(ControllerError::Transition(TransitionError::InvalidTransition { .. }))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn terminated_events_do_not_move_the_task() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Analysis, false).await?;

    harness
        .controller
        .handle_event(event(&task, Phase::Analysis, PhaseOutcome::Terminated))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Analysis);
    ensure!(
        stored
            .stage_results()
            .iter()
            .any(|entry| entry.status == StageStatus::Info)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_transition_retries_surface_as_invalid() -> eyre::Result<()> {
    let config = test_config();
    let clock = Arc::new(DefaultClock);
    let inner = Arc::new(InMemoryTaskRepository::new());
    let repository = Arc::new(ContestedRepository {
        inner: Arc::clone(&inner),
    });
    let launcher = Arc::new(ScriptedLauncher::new());
    let registry = Arc::new(ResourceRegistry::new(
        Arc::new(FakePortProbe::new()),
        Arc::clone(&clock),
    ));
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let supervisor = SessionSupervisor::new(
        Arc::clone(&launcher),
        Arc::clone(&clock),
        Arc::new(config.clone()),
        Arc::clone(&registry) as Arc<dyn SessionCleanup>,
        events_tx,
    );
    let state_machine = Arc::new(TaskStateMachine::new(
        Arc::clone(&repository),
        Arc::clone(&clock),
    ));
    let controller = ModeController::new(
        state_machine,
        Arc::clone(&repository),
        Arc::new(WorkspaceManager::new(
            Arc::new(InMemoryVcs::new()),
            config.workspaces_root.clone(),
        )),
        registry,
        supervisor,
        clock,
    );
    let task = Task::new(
        "Contested task",
        BranchName::new("task/contested")?,
        TaskPriority::Medium,
        false,
        &DefaultClock,
    )?;
    inner.create(&task).await?;

    let result = controller.start_task(task.id()).await;

    // Every commit loses to a phantom writer whose last observed status is
    // Blocked; exhausted retries report the edge against that status.
    ensure!(matches!(
        result,
        Err(ControllerError::Transition(TransitionError::InvalidTransition {
            from: TaskStatus::Blocked,
            to: TaskStatus::Analysis,
            ..
        }))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_tracking_is_pruned_when_a_task_completes() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::CodeReview, false).await?;
    harness.vcs.seed_branch(task.branch_name());

    harness
        .controller
        .handle_event(event(&task, Phase::Review, PhaseOutcome::Succeeded))
        .await?;

    let stored = harness.stored(task.id()).await?;
    ensure!(stored.status() == TaskStatus::Done);
    ensure!(harness.controller.tracked_events() == 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn notifications_report_status_changes() -> eyre::Result<()> {
    let harness = harness();
    let task = harness.seed_task(TaskStatus::Backlog, false).await?;
    harness.launcher.push_run(ScriptedRun::hanging(["analysing"]));
    let mut notifications = harness.controller.subscribe();

    harness.controller.start_task(task.id()).await?;

    let first = notifications.recv().await?;
    ensure!(matches!(
        first,
        TaskNotification::StatusChanged { task_id, from: TaskStatus::Backlog, to: TaskStatus::Analysis }
            if task_id == task.id()
    ));
    Ok(())
}
