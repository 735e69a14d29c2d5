//! The mode controller: event consumption, transition driving, side
//! effects.

use crate::config::ProjectConfig;
use crate::controller::events::{PhaseOutcome, SessionEvent, TaskNotification};
use crate::resource::ports::PortProbe;
use crate::resource::services::{ResourceError, ResourceRegistry};
use crate::session::domain::SessionError;
use crate::session::ports::AgentLauncher;
use crate::session::services::SessionSupervisor;
use crate::task::domain::{
    EventId, Phase, SessionId, SideEffect, StageResult, StageStatus, Task, TaskDomainError,
    TaskId, TaskStatus, merge_details,
};
use crate::task::ports::{TaskRepository, TaskRepositoryError};
use crate::task::services::{TaskStateMachine, TransitionError, TransitionOutcome, TransitionRequest};
use crate::workspace::domain::{MergeStrategy, WorkspaceError};
use crate::workspace::ports::Vcs;
use crate::workspace::services::WorkspaceManager;
use mockable::Clock;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Bounded compare-and-set retries before a contested transition is
/// surfaced to the caller.
const MAX_CAS_RETRIES: u32 = 3;

/// Errors returned by the mode controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// A status transition was rejected.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The task repository failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),

    /// A workspace operation failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A resource operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A task aggregate invariant was violated.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// The event referenced a task that does not exist.
    #[error("task not found: {0}")]
    UnknownTask(TaskId),

    /// The replay-protection set lock was poisoned.
    #[error("controller state lock poisoned")]
    Poisoned,
}

/// Decides how each finished phase moves its task, and executes the
/// resulting side effects.
///
/// Manual-mode tasks halt with the outcome recorded for human review;
/// automatic-mode tasks advance forward on success (merging first when the
/// review phase approves), step backward with a reason on phase failure,
/// and block on terminal session failures. Duplicate event deliveries are
/// dropped via a processed-set keyed on task, phase, and event id.
pub struct ModeController<R, V, L, P, C>
where
    R: TaskRepository,
    V: Vcs,
    L: AgentLauncher + 'static,
    P: PortProbe,
    C: Clock + Send + Sync + 'static,
{
    state_machine: Arc<TaskStateMachine<R, C>>,
    repository: Arc<R>,
    workspaces: Arc<WorkspaceManager<V>>,
    registry: Arc<ResourceRegistry<P, C>>,
    supervisor: SessionSupervisor<L, C>,
    clock: Arc<C>,
    notifications: broadcast::Sender<TaskNotification>,
    processed: Mutex<HashSet<(TaskId, Phase, EventId)>>,
}

impl<R, V, L, P, C> ModeController<R, V, L, P, C>
where
    R: TaskRepository,
    V: Vcs,
    L: AgentLauncher + 'static,
    P: PortProbe,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a controller over the given collaborators.
    #[must_use]
    pub fn new(
        state_machine: Arc<TaskStateMachine<R, C>>,
        repository: Arc<R>,
        workspaces: Arc<WorkspaceManager<V>>,
        registry: Arc<ResourceRegistry<P, C>>,
        supervisor: SessionSupervisor<L, C>,
        clock: Arc<C>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(64);
        Self {
            state_machine,
            repository,
            workspaces,
            registry,
            supervisor,
            clock,
            notifications,
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Subscribes to task notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskNotification> {
        self.notifications.subscribe()
    }

    /// Consumes session events until the channel closes.
    ///
    /// Individual event failures are logged and do not stop the loop; one
    /// task's broken workspace must not stall the fleet.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.handle_event(event).await {
                error!(error = %err, "session event handling failed");
            }
        }
    }

    /// Handles one session event.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] when the task is missing or a
    /// transition, workspace, session, or repository operation fails.
    pub async fn handle_event(&self, event: SessionEvent) -> Result<(), ControllerError> {
        if !self.mark_processed(&event)? {
            debug!(task_id = %event.task_id, event_id = %event.event_id, "duplicate event dropped");
            return Ok(());
        }

        let mut task = self
            .repository
            .get(event.task_id)
            .await?
            .ok_or(ControllerError::UnknownTask(event.task_id))?;
        self.record_outcome(&mut task, &event).await?;
        self.notify(TaskNotification::SessionFinished {
            task_id: event.task_id,
            phase: event.phase,
            outcome: event.outcome.clone(),
        });

        if task.manual_mode() {
            info!(task_id = %event.task_id, phase = %event.phase, "manual mode: awaiting human action");
            return Ok(());
        }

        match event.outcome {
            PhaseOutcome::Succeeded => self.advance(&task, event.phase).await,
            PhaseOutcome::Failed { reason } => {
                self.step_back(event.task_id, event.phase, reason).await
            }
            PhaseOutcome::Crashed { reason } => {
                self.request_transition(event.task_id, TaskStatus::Blocked, "controller", Some(reason))
                    .await
            }
            PhaseOutcome::Terminated => Ok(()),
        }
    }

    /// Drives one status transition with bounded compare-and-set retries,
    /// then executes the committed transition's side effects.
    ///
    /// This is also the entry point for human-driven transitions (starting
    /// a backlog task, unblocking, cancelling). A transition still contested
    /// after the retry bound surfaces as
    /// [`TransitionError::InvalidTransition`] against the last observed
    /// status; the caller must re-inspect the task.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] when the transition is rejected, the
    /// retry bound is exhausted, or a side effect fails.
    pub async fn request_transition(
        &self,
        task_id: TaskId,
        target: TaskStatus,
        actor: &str,
        reason: Option<String>,
    ) -> Result<(), ControllerError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let current = self
                .repository
                .get(task_id)
                .await?
                .ok_or(ControllerError::UnknownTask(task_id))?
                .status();
            let mut request = TransitionRequest::new(task_id, target, actor, current);
            if let Some(text) = &reason {
                request = request.with_reason(text.clone());
            }
            match self.state_machine.request_transition(request).await {
                Ok(outcome) => {
                    self.notify(TaskNotification::StatusChanged {
                        task_id,
                        from: current,
                        to: outcome.new_status,
                    });
                    if outcome.new_status.is_terminal() {
                        self.forget_task_events(task_id)?;
                    }
                    return self.execute_effects(outcome).await;
                }
                Err(TransitionError::ConcurrencyConflict { .. }) if attempt < MAX_CAS_RETRIES => {
                    debug!(%task_id, attempt, "transition lost a race, retrying");
                }
                Err(TransitionError::ConcurrencyConflict { actual, .. }) => {
                    warn!(%task_id, attempts = attempt, "transition retries exhausted");
                    return Err(TransitionError::InvalidTransition {
                        task_id,
                        from: actual,
                        to: target,
                        allowed: actual.allowed_successors(),
                    }
                    .into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Starts a backlog task on its analysis phase.
    ///
    /// # Errors
    ///
    /// Returns a [`ControllerError`] when the task is not in `Backlog` or
    /// a side effect fails.
    pub async fn start_task(&self, task_id: TaskId) -> Result<(), ControllerError> {
        self.request_transition(task_id, TaskStatus::Analysis, "controller", None)
            .await
    }

    /// Records the event outcome in the task's audit trail and detaches
    /// the finished session.
    async fn record_outcome(
        &self,
        task: &mut Task,
        event: &SessionEvent,
    ) -> Result<(), ControllerError> {
        let entry = match &event.outcome {
            PhaseOutcome::Succeeded => {
                StageResult::success(format!("{} phase completed", event.phase), &*self.clock)
            }
            PhaseOutcome::Failed { reason } => {
                StageResult::failure(format!("{} phase failed", event.phase), &*self.clock)
                    .with_details(json!({ "reason": reason }))
            }
            PhaseOutcome::Crashed { reason } => {
                StageResult::failure(format!("{} session failed", event.phase), &*self.clock)
                    .with_details(json!({ "reason": reason }))
            }
            PhaseOutcome::Terminated => StageResult::new(
                StageStatus::Info,
                format!("{} session terminated", event.phase),
                serde_json::Value::Null,
                &*self.clock,
            ),
        }
        .with_phase(event.phase);

        let summary = entry.summary.clone();
        task.record_stage_result(entry, &*self.clock);
        task.detach_session(&*self.clock);
        self.repository.update(task).await?;
        self.notify(TaskNotification::StageRecorded {
            task_id: task.id(),
            summary,
        });
        Ok(())
    }

    /// Advances an automatic-mode task after a successful phase.
    async fn advance(&self, task: &Task, phase: Phase) -> Result<(), ControllerError> {
        let target = match phase {
            Phase::Analysis => TaskStatus::InProgress,
            Phase::Implementation => TaskStatus::Testing,
            Phase::Testing => TaskStatus::CodeReview,
            Phase::Review => TaskStatus::Done,
        };
        if phase == Phase::Review && !self.merge_for_review(task).await? {
            // Merge conflict recorded; the task stays in review.
            return Ok(());
        }
        self.request_transition(task.id(), target, "controller", None)
            .await
    }

    /// Steps an automatic-mode task backward after a phase failure.
    async fn step_back(
        &self,
        task_id: TaskId,
        phase: Phase,
        reason: String,
    ) -> Result<(), ControllerError> {
        let target = match phase {
            Phase::Analysis => TaskStatus::Backlog,
            Phase::Implementation => TaskStatus::Analysis,
            Phase::Testing => TaskStatus::InProgress,
            Phase::Review => TaskStatus::Testing,
        };
        self.request_transition(task_id, target, "controller", Some(reason))
            .await
    }

    /// Merges the reviewed branch into trunk.
    ///
    /// Returns `true` when the merge landed and the task may move to
    /// `Done`. A conflict records the conflicting paths verbatim and
    /// returns `false`; no automatic resolution is attempted.
    async fn merge_for_review(&self, task: &Task) -> Result<bool, ControllerError> {
        match self.workspaces.merge(task, MergeStrategy::MergeCommit).await {
            Ok(outcome) => {
                self.append_stage(
                    task.id(),
                    StageResult::success("merged into trunk", &*self.clock)
                        .with_phase(Phase::Review)
                        .with_details(merge_details(outcome.merge_commit)),
                )
                .await?;
                Ok(true)
            }
            Err(WorkspaceError::MergeConflict { paths }) => {
                warn!(task_id = %task.id(), ?paths, "merge conflict, task stays in review");
                self.append_stage(
                    task.id(),
                    StageResult::failure("merge conflict", &*self.clock)
                        .with_phase(Phase::Review)
                        .with_details(json!({ "conflicts": paths })),
                )
                .await?;
                Ok(false)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Re-reads the task and appends one stage result.
    async fn append_stage(
        &self,
        task_id: TaskId,
        entry: StageResult,
    ) -> Result<(), ControllerError> {
        let mut task = self
            .repository
            .get(task_id)
            .await?
            .ok_or(ControllerError::UnknownTask(task_id))?;
        let summary = entry.summary.clone();
        task.record_stage_result(entry, &*self.clock);
        self.repository.update(&task).await?;
        self.notify(TaskNotification::StageRecorded { task_id, summary });
        Ok(())
    }

    /// Executes a committed transition's side effects, in order.
    async fn execute_effects(&self, outcome: TransitionOutcome) -> Result<(), ControllerError> {
        let mut task = outcome.task;
        for effect in outcome.effects {
            match effect {
                SideEffect::ProvisionWorkspace => self.provision_workspace(&mut task).await?,
                SideEffect::SyncWorkspace => {
                    self.workspaces.sync(&task).await?;
                }
                SideEffect::SpawnSession(phase) => self.spawn_session(&mut task, phase).await?,
                SideEffect::StopSession => self.stop_session(&mut task).await?,
                SideEffect::MergeWorkspace => self.merge_workspace(&mut task).await?,
                SideEffect::RemoveWorkspace => self.remove_workspace(&mut task).await?,
                SideEffect::ReleaseResources => self.release_resources(task.id())?,
            }
        }
        Ok(())
    }

    /// Provisions the task's workspace, or refreshes it when one already
    /// exists (re-entry after a block keeps the original worktree).
    async fn provision_workspace(&self, task: &mut Task) -> Result<(), ControllerError> {
        if task.workspace_path().is_some() {
            self.workspaces.sync(task).await?;
            return Ok(());
        }
        let workspace = self.workspaces.create(task).await?;
        task.attach_workspace(workspace.path.clone(), &*self.clock)?;
        self.repository.update(task).await?;
        Ok(())
    }

    /// Spawns the phase session in the task's worktree.
    ///
    /// The session id is attached and persisted before the process
    /// launches, so the monitor's terminal event can never race a stale
    /// task write from this side.
    async fn spawn_session(&self, task: &mut Task, phase: Phase) -> Result<(), ControllerError> {
        let workdir = task.workspace_path().map_or_else(
            || self.workspaces.path_for(task.id()),
            Path::to_path_buf,
        );
        if task.active_session().is_some() && !self.supervisor.is_active(task.id()) {
            // Stale reference left by a session that ended out of band.
            task.detach_session(&*self.clock);
        }
        let session_id = SessionId::new();
        task.attach_session(session_id, &*self.clock)?;
        self.repository.update(task).await?;
        if let Err(err) = self.supervisor.spawn(task, phase, &workdir, session_id) {
            task.detach_session(&*self.clock);
            self.repository.update(task).await?;
            return Err(err.into());
        }
        Ok(())
    }

    /// Stops the task's session; a session that already ended is fine.
    async fn stop_session(&self, task: &mut Task) -> Result<(), ControllerError> {
        match self.supervisor.stop(task.id()).await {
            Ok(()) | Err(SessionError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        task.detach_session(&*self.clock);
        self.repository.update(task).await?;
        Ok(())
    }

    /// Merges the task's branch into trunk and records the merge commit.
    async fn merge_workspace(&self, task: &mut Task) -> Result<(), ControllerError> {
        let merged = self.workspaces.merge(task, MergeStrategy::MergeCommit).await?;
        let entry = StageResult::success("merged into trunk", &*self.clock)
            .with_phase(Phase::Review)
            .with_details(merge_details(merged.merge_commit));
        task.record_stage_result(entry, &*self.clock);
        self.repository.update(task).await?;
        Ok(())
    }

    /// Removes the task's worktree and branch.
    async fn remove_workspace(&self, task: &mut Task) -> Result<(), ControllerError> {
        self.workspaces.remove(task, true).await?;
        task.detach_workspace(&*self.clock);
        self.repository.update(task).await?;
        Ok(())
    }

    /// Releases every lease held by the task.
    fn release_resources(&self, task_id: TaskId) -> Result<(), ControllerError> {
        let freed = self.registry.release(task_id)?;
        if !freed.is_empty() {
            self.notify(TaskNotification::ResourcesReleased {
                task_id,
                released: freed.len(),
            });
        }
        Ok(())
    }

    /// Records the event in the replay-protection set.
    ///
    /// Returns `false` when the event was already processed.
    fn mark_processed(&self, event: &SessionEvent) -> Result<bool, ControllerError> {
        let mut processed = self.processed.lock().map_err(|_| ControllerError::Poisoned)?;
        Ok(processed.insert((event.task_id, event.phase, event.event_id)))
    }

    /// Drops replay-protection entries for a task that reached a terminal
    /// status. Terminal tasks accept no further transitions, so a late
    /// duplicate can no longer move them.
    fn forget_task_events(&self, task_id: TaskId) -> Result<(), ControllerError> {
        let mut processed = self.processed.lock().map_err(|_| ControllerError::Poisoned)?;
        processed.retain(|(id, _, _)| *id != task_id);
        Ok(())
    }

    /// Number of events currently tracked for replay protection.
    #[cfg(test)]
    pub(crate) fn tracked_events(&self) -> usize {
        self.processed.lock().map_or(0, |processed| processed.len())
    }

    /// Publishes a notification; observers are optional.
    fn notify(&self, notification: TaskNotification) {
        drop(self.notifications.send(notification));
    }
}
