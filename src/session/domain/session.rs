//! Session record and lifecycle states.

use crate::task::domain::{Phase, SessionId, TaskId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// How a session participates in the task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A phase-driving session registered with the supervisor.
    Interactive,
    /// A fire-and-forget helper invocation. Ephemeral sessions never hold
    /// task leases and are force-terminated once their output is captured.
    /// The supervisor runs them without registering a [`Session`] record;
    /// this tag exists for callers that persist their own session rows
    /// alongside the interactive ones.
    Ephemeral,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The agent process is being launched.
    Starting,
    /// The agent process is running.
    Running,
    /// The session finished its phase (clean exit or completion marker).
    Completed,
    /// The session failed terminally (timeout, or retries exhausted).
    Failed,
    /// The session was stopped on request.
    Terminated,
}

impl SessionState {
    /// Returns `true` when the session can no longer change state.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Terminated)
    }
}

/// One supervised agent process bound to a task and phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    task_id: TaskId,
    phase: Phase,
    kind: SessionKind,
    state: SessionState,
    attempts: u32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a session record in the `Starting` state.
    ///
    /// The caller supplies the identifier so it can be persisted on the
    /// task before the process launches.
    #[must_use]
    pub fn new(
        id: SessionId,
        task_id: TaskId,
        phase: Phase,
        kind: SessionKind,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id,
            task_id,
            phase,
            kind,
            state: SessionState::Starting,
            attempts: 0,
            started_at: clock.utc(),
            finished_at: None,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the phase this session works.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the session kind.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the number of launch attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns when the session record was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the session reached a final state, if it has.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Records the start of a launch attempt.
    pub(crate) const fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.state = SessionState::Running;
    }

    /// Moves the session into a final state.
    pub(crate) fn finish(&mut self, state: SessionState, clock: &impl Clock) {
        self.state = state;
        self.finished_at = Some(clock.utc());
    }
}
