//! Session error taxonomy.

use crate::config::ConfigError;
use crate::task::domain::TaskId;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by session supervision.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The agent process could not be launched.
    #[error("failed to spawn agent process `{program}`: {detail}")]
    SpawnFailed {
        /// Program that failed to launch.
        program: String,
        /// Launcher-reported failure detail.
        detail: String,
    },

    /// The agent process exited without completing its phase.
    #[error("session exited unexpectedly with code {code:?}")]
    UnexpectedExit {
        /// Exit code, when the process exited rather than being killed.
        code: Option<i32>,
    },

    /// The session attempt exceeded its wall-clock limit.
    #[error("session timed out after {after:?}")]
    Timeout {
        /// Configured limit that was exceeded.
        after: Duration,
    },

    /// No active session exists for the task.
    #[error("no active session for task {0}")]
    NotFound(TaskId),

    /// The task already has an active session.
    #[error("task {0} already has an active session")]
    AlreadyRunning(TaskId),

    /// The phase command could not be resolved or rendered.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Process or supervisor-internal I/O failed.
    #[error("session supervisor failure: {0}")]
    Internal(String),
}
