//! Domain types for the task context.

mod branch;
mod error;
mod ids;
mod stage_result;
mod status;
mod task;

pub use branch::BranchName;
pub use error::{ParseTaskStatusError, TaskDomainError};
pub use ids::{EventId, LeaseId, SessionId, TaskId};
pub use stage_result::{MERGE_COMMIT_KEY, StageResult, StageStatus, merge_details};
pub use status::{Phase, SideEffect, TaskStatus};
pub use task::{PersistedTaskData, Task, TaskPriority};
