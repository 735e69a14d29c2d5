//! Thread-safe in-memory task repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::task::{
    domain::{StageResult, Task, TaskId, TaskStatus},
    ports::{TaskFilter, TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
///
/// The single `RwLock` write guard makes every mutating call atomic,
/// matching the atomicity the persistence collaborator contract assumes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(err: impl std::fmt::Display) -> TaskRepositoryError {
    TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.contains_key(&task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id()));
        }
        state.insert(task.id(), task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.get(&id).cloned())
    }

    async fn list(&self, filter: TaskFilter) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect())
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let stored_status = state
            .get(&task.id())
            .ok_or(TaskRepositoryError::NotFound(task.id()))?
            .status();

        // The stored status is authoritative; update never changes it.
        let mut updated = task.clone();
        updated.force_status(stored_status);
        state.insert(updated.id(), updated);
        Ok(())
    }

    async fn compare_and_swap_status(
        &self,
        id: TaskId,
        expected: TaskStatus,
        new_status: TaskStatus,
        audit: StageResult,
    ) -> TaskRepositoryResult<Task> {
        let mut state = self.state.write().map_err(poisoned)?;
        let task = state
            .get_mut(&id)
            .ok_or(TaskRepositoryError::NotFound(id))?;

        let actual = task.status();
        if actual != expected {
            return Err(TaskRepositoryError::StatusConflict {
                task_id: id,
                expected,
                actual,
            });
        }

        task.commit_status(new_status, audit);
        Ok(task.clone())
    }
}
