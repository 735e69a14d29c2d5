//! Repository port for task persistence and compare-and-swap status commits.

use crate::task::domain::{StageResult, Task, TaskId, TaskStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Listing filter for [`TaskRepository::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Restrict results to tasks in this status.
    pub status: Option<TaskStatus>,
    /// Restrict results to tasks with this frozen manual-mode flag.
    pub manual_mode: Option<bool>,
}

impl TaskFilter {
    /// Matches every task.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            status: None,
            manual_mode: None,
        }
    }

    /// Matches tasks in the given status.
    #[must_use]
    pub const fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            manual_mode: None,
        }
    }

    /// Returns `true` when the task satisfies the filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|status| task.status() == status)
            && self
                .manual_mode
                .is_none_or(|manual| task.manual_mode() == manual)
    }
}

/// Task persistence contract.
///
/// Each call is assumed atomic. The persisted `status` field is the single
/// source of truth for a task's workflow position and only ever changes
/// through [`TaskRepository::compare_and_swap_status`]; [`TaskRepository::update`]
/// persists every other field and leaves the stored status untouched.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task ID
    /// already exists.
    async fn create(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn get(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Returns every task matching the filter.
    async fn list(&self, filter: TaskFilter) -> TaskRepositoryResult<Vec<Task>>;

    /// Persists changes to an existing task's non-status fields (stage
    /// results, workspace path, session attachment, testing URLs).
    ///
    /// Implementations keep the stored status, so a stale caller cannot
    /// smuggle a status write past the compare-and-swap path.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not
    /// exist.
    async fn update(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Atomically commits a status change together with its audit entry.
    ///
    /// The commit succeeds only when the stored status equals `expected`;
    /// the audit entry is appended in the same atomic step and the updated
    /// task is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::StatusConflict`] when the stored
    /// status differs from `expected` (a concurrent writer won the race;
    /// nothing is mutated), or [`TaskRepositoryError::NotFound`] when the
    /// task does not exist.
    async fn compare_and_swap_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        new_status: TaskStatus,
        audit: StageResult,
    ) -> TaskRepositoryResult<Task>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The stored status did not match the caller's expectation.
    #[error("status conflict on task {task_id}: expected {expected}, found {actual}")]
    StatusConflict {
        /// Task whose status was contested.
        task_id: TaskId,
        /// Status the caller believed was current.
        expected: TaskStatus,
        /// Status actually stored.
        actual: TaskStatus,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
