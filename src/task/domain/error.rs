//! Error types for task domain validation and parsing.

use super::TaskId;
use thiserror::Error;

/// Errors returned while constructing or mutating domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The branch name is empty, malformed, or too long.
    #[error("invalid branch name: {0:?}")]
    InvalidBranchName(String),

    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// A blocking transition was requested without a reason.
    #[error("transition to blocked requires a non-empty reason")]
    MissingBlockReason,

    /// A workspace is already attached to the task.
    #[error("task {0} already has an active workspace")]
    WorkspaceAlreadyActive(TaskId),

    /// A session is already attached to the task.
    #[error("task {0} already has an active session")]
    SessionAlreadyActive(TaskId),
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);
