//! Resource cleanup hook run on session exit.

use crate::task::domain::TaskId;

/// Releases a task's resource leases when its session ends.
///
/// The supervisor invokes this on every interactive session exit path
/// (completion, failure, timeout, stop), so leases never outlive the
/// session that needed them. Implementations must be infallible from the
/// caller's perspective; failures are logged, not propagated.
pub trait SessionCleanup: Send + Sync {
    /// Releases every lease held by the task.
    fn release_task(&self, task_id: TaskId);
}
