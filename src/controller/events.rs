//! Events flowing between the supervisor, controller, and observers.

use crate::task::domain::{EventId, Phase, SessionId, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};

/// Final outcome of one supervised phase session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// The agent completed the phase (clean exit or completion marker).
    Succeeded,
    /// The agent finished but the phase did not pass; the task should step
    /// backward.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The session failed terminally (timeout, or retry budget exhausted);
    /// the task should block for human attention.
    Crashed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The session was stopped on request; no transition is implied.
    Terminated,
}

impl PhaseOutcome {
    /// Returns `true` when the phase completed successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// One session's terminal report, emitted exactly once per session.
///
/// The `event_id` is unique per emission; together with the task and phase
/// it forms the controller's replay-protection key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Unique identifier for this emission.
    pub event_id: EventId,
    /// Session that finished.
    pub session_id: SessionId,
    /// Task the session belonged to.
    pub task_id: TaskId,
    /// Phase the session worked.
    pub phase: Phase,
    /// How the session ended.
    pub outcome: PhaseOutcome,
}

/// Observer-facing notification published by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskNotification {
    /// A status transition was committed.
    StatusChanged {
        /// Task whose status changed.
        task_id: TaskId,
        /// Previous status.
        from: TaskStatus,
        /// New status.
        to: TaskStatus,
    },
    /// A stage result was recorded.
    StageRecorded {
        /// Task whose log grew.
        task_id: TaskId,
        /// Summary of the recorded entry.
        summary: String,
    },
    /// A session reached a final state.
    SessionFinished {
        /// Task the session belonged to.
        task_id: TaskId,
        /// Phase the session worked.
        phase: Phase,
        /// How the session ended.
        outcome: PhaseOutcome,
    },
    /// Resource leases were released.
    ResourcesReleased {
        /// Task whose leases were freed.
        task_id: TaskId,
        /// Number of leases freed.
        released: usize,
    },
}
