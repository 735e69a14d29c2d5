//! Compare-and-set state machine over the task transition graph.

use crate::task::{
    domain::{SideEffect, StageResult, StageStatus, Task, TaskId, TaskStatus},
    ports::{TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Request payload for a status transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    /// Task whose status should change.
    pub task_id: TaskId,
    /// Requested target status.
    pub target: TaskStatus,
    /// Who requested the transition (`"controller"`, an operator name).
    pub actor: String,
    /// Status the caller believes is currently persisted.
    pub expected_current: TaskStatus,
    /// Human-readable reason; mandatory when `target` is `Blocked`, and
    /// recorded for backward transitions.
    pub reason: Option<String>,
}

impl TransitionRequest {
    /// Creates a transition request without a reason.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        target: TaskStatus,
        actor: impl Into<String>,
        expected_current: TaskStatus,
    ) -> Self {
        Self {
            task_id,
            target,
            actor: actor.into(),
            expected_current,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// The task as persisted after the commit.
    pub task: Task,
    /// The committed status.
    pub new_status: TaskStatus,
    /// Instructions for other components (workspace provisioning, session
    /// spawning, resource release). The state machine never executes these.
    pub effects: Vec<SideEffect>,
}

/// Result type for transition attempts.
pub type TransitionResult = Result<TransitionOutcome, TransitionError>;

/// Errors returned by [`TaskStateMachine::request_transition`].
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    /// The requested edge is absent from the declared transition graph.
    #[error("invalid transition for task {task_id}: {from} -> {to}, allowed: {allowed:?}")]
    InvalidTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Status the task held.
        from: TaskStatus,
        /// Requested target status.
        to: TaskStatus,
        /// Legal successor statuses from `from`.
        allowed: Vec<TaskStatus>,
    },

    /// The edge exists but its guard is unsatisfied.
    #[error("guard not satisfied for task {task_id} ({from} -> {to}): {requirement}")]
    GuardNotSatisfied {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Status the task held.
        from: TaskStatus,
        /// Requested target status.
        to: TaskStatus,
        /// Human-readable description of the unmet requirement.
        requirement: String,
    },

    /// The caller's expected status lost a race against a concurrent writer.
    ///
    /// Nothing was mutated; the caller must re-read and retry.
    #[error("concurrency conflict on task {task_id}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Task whose status was contested.
        task_id: TaskId,
        /// Status the caller supplied.
        expected: TaskStatus,
        /// Status actually persisted.
        actual: TaskStatus,
    },

    /// A transition to `Blocked` was requested without a reason.
    #[error("transition to blocked requires a non-empty reason")]
    MissingBlockReason,

    /// The task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The repository failed.
    #[error(transparent)]
    Repository(TaskRepositoryError),
}

/// The authoritative task state machine.
///
/// Validates requested edges against the declared graph, evaluates
/// forward-edge guards, and commits status changes through the repository's
/// compare-and-swap operation so concurrent transition attempts never
/// silently overwrite each other. Every accepted or rejected edge appends a
/// stage-result audit entry; compare-and-swap conflicts append nothing
/// because nothing was committed.
#[derive(Clone)]
pub struct TaskStateMachine<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> TaskStateMachine<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a state machine over the given repository.
    #[must_use]
    pub const fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self { repository, clock }
    }

    /// Attempts a status transition with compare-and-set semantics.
    ///
    /// On success returns the committed status and the side-effect
    /// instructions for the target status. On a compare-and-set mismatch
    /// returns [`TransitionError::ConcurrencyConflict`] without mutating
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the task is missing, the edge is
    /// absent from the graph, the guard is unsatisfied, the block reason is
    /// missing, the compare-and-set loses a race, or the repository fails.
    pub async fn request_transition(&self, request: TransitionRequest) -> TransitionResult {
        let task = self
            .repository
            .get(request.task_id)
            .await
            .map_err(TransitionError::Repository)?
            .ok_or(TransitionError::NotFound(request.task_id))?;

        let from = task.status();
        if from != request.expected_current {
            // Cheap pre-check; the repository CAS below is authoritative.
            return Err(TransitionError::ConcurrencyConflict {
                task_id: request.task_id,
                expected: request.expected_current,
                actual: from,
            });
        }

        if let Err(err) = Self::validate_edge(&task, &request) {
            self.record_rejection(task, &request, &err).await?;
            return Err(err);
        }

        let audit = self.success_audit(&request, from);
        let committed = self
            .repository
            .compare_and_swap_status(request.task_id, from, request.target, audit)
            .await
            .map_err(|err| Self::map_cas_error(&request, err))?;

        debug!(
            task_id = %request.task_id,
            from = %from,
            to = %request.target,
            actor = %request.actor,
            "transition committed"
        );

        Ok(TransitionOutcome {
            new_status: request.target,
            effects: request.target.entry_effects(),
            task: committed,
        })
    }

    /// Validates the edge, block reason, and guard for a request.
    fn validate_edge(task: &Task, request: &TransitionRequest) -> Result<(), TransitionError> {
        let from = task.status();
        if !from.can_transition_to(request.target) {
            return Err(TransitionError::InvalidTransition {
                task_id: request.task_id,
                from,
                to: request.target,
                allowed: from.allowed_successors(),
            });
        }

        if request.target == TaskStatus::Blocked
            && request.reason.as_deref().is_none_or(|r| r.trim().is_empty())
        {
            return Err(TransitionError::MissingBlockReason);
        }

        if let Some(requirement) = guard_failure(task, request.target) {
            return Err(TransitionError::GuardNotSatisfied {
                task_id: request.task_id,
                from,
                to: request.target,
                requirement,
            });
        }

        Ok(())
    }

    /// Appends a failure audit entry for a rejected edge.
    async fn record_rejection(
        &self,
        mut task: Task,
        request: &TransitionRequest,
        err: &TransitionError,
    ) -> Result<(), TransitionError> {
        warn!(
            task_id = %request.task_id,
            target = %request.target,
            error = %err,
            "transition rejected"
        );
        let entry = StageResult::new(
            StageStatus::Failure,
            format!(
                "transition {} -> {} rejected",
                task.status(),
                request.target
            ),
            json!({
                "actor": request.actor,
                "error": err.to_string(),
            }),
            &*self.clock,
        );
        task.record_stage_result(entry, &*self.clock);
        self.repository
            .update(&task)
            .await
            .map_err(TransitionError::Repository)
    }

    /// Builds the audit entry committed alongside a successful transition.
    fn success_audit(&self, request: &TransitionRequest, from: TaskStatus) -> StageResult {
        let mut details = json!({
            "actor": request.actor,
            "from": from.as_str(),
            "to": request.target.as_str(),
        });
        if let (Some(reason), Some(map)) = (&request.reason, details.as_object_mut()) {
            map.insert("reason".to_owned(), json!(reason));
        }
        StageResult::new(
            StageStatus::Success,
            format!("transition {} -> {}", from, request.target),
            details,
            &*self.clock,
        )
    }

    /// Translates repository CAS errors into transition errors.
    fn map_cas_error(request: &TransitionRequest, err: TaskRepositoryError) -> TransitionError {
        match err {
            TaskRepositoryError::StatusConflict {
                task_id,
                expected,
                actual,
            } => TransitionError::ConcurrencyConflict {
                task_id,
                expected,
                actual,
            },
            TaskRepositoryError::NotFound(id) => TransitionError::NotFound(id),
            other => {
                warn!(task_id = %request.task_id, error = %other, "repository failure");
                TransitionError::Repository(other)
            }
        }
    }
}

/// Returns the unmet requirement for a guarded forward edge, if any.
fn guard_failure(task: &Task, target: TaskStatus) -> Option<String> {
    use crate::task::domain::Phase;

    match target {
        TaskStatus::InProgress if task.status() == TaskStatus::Analysis => {
            (!task.has_successful_stage(Phase::Analysis))
                .then(|| "analysis artifacts must be recorded".to_owned())
        }
        TaskStatus::Testing if task.status() == TaskStatus::InProgress => {
            (!task.has_successful_stage(Phase::Analysis))
                .then(|| "analysis artifacts must be recorded".to_owned())
        }
        TaskStatus::CodeReview if task.status() == TaskStatus::Testing => {
            (!task.has_successful_stage(Phase::Testing))
                .then(|| "a green testing stage must be recorded".to_owned())
        }
        TaskStatus::Done => {
            (!task.has_merge_result()).then(|| "a successful merge must be recorded".to_owned())
        }
        _ => None,
    }
}
