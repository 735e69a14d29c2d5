//! Task aggregate root and related lifecycle types.

use super::{
    BranchName, Phase, SessionId, StageResult, TaskDomainError, TaskId, TaskStatus,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Scheduling priority of a task relative to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Work on when nothing else is pending.
    Low,
    /// Default priority.
    Medium,
    /// Work on ahead of other tasks.
    High,
}

/// Task aggregate root.
///
/// The `status` field is the single source of truth for the task's position
/// in the workflow. It is mutated exclusively through the repository port's
/// compare-and-swap operation; no other code path writes it once the task
/// is persisted. The `manual_mode` flag is copied from project configuration
/// at creation time and is immutable for the task's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    title: String,
    status: TaskStatus,
    priority: TaskPriority,
    branch_name: BranchName,
    workspace_path: Option<PathBuf>,
    active_session: Option<SessionId>,
    stage_results: Vec<StageResult>,
    testing_urls: BTreeMap<String, String>,
    manual_mode: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted title.
    pub title: String,
    /// Persisted lifecycle status.
    pub status: TaskStatus,
    /// Persisted priority.
    pub priority: TaskPriority,
    /// Persisted feature branch name.
    pub branch_name: BranchName,
    /// Persisted workspace path, if provisioned.
    pub workspace_path: Option<PathBuf>,
    /// Persisted active session, if any.
    pub active_session: Option<SessionId>,
    /// Persisted stage-result log.
    pub stage_results: Vec<StageResult>,
    /// Persisted testing URL map.
    pub testing_urls: BTreeMap<String, String>,
    /// Persisted frozen manual-mode flag.
    pub manual_mode: bool,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest lifecycle timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a new task in `Backlog`.
    ///
    /// The `manual_mode` flag is the project configuration value frozen for
    /// this task's lifetime; later configuration changes affect only newly
    /// created tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] when the title is empty after
    /// trimming.
    pub fn new(
        title: impl Into<String>,
        branch_name: BranchName,
        priority: TaskPriority,
        manual_mode: bool,
        clock: &impl Clock,
    ) -> Result<Self, TaskDomainError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(TaskDomainError::EmptyTitle);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: TaskId::new(),
            title,
            status: TaskStatus::Backlog,
            priority,
            branch_name,
            workspace_path: None,
            active_session: None,
            stage_results: Vec::new(),
            testing_urls: BTreeMap::new(),
            manual_mode,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            title: data.title,
            status: data.status,
            priority: data.priority,
            branch_name: data.branch_name,
            workspace_path: data.workspace_path,
            active_session: data.active_session,
            stage_results: data.stage_results,
            testing_urls: data.testing_urls,
            manual_mode: data.manual_mode,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the scheduling priority.
    #[must_use]
    pub const fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Returns the feature branch name.
    #[must_use]
    pub const fn branch_name(&self) -> &BranchName {
        &self.branch_name
    }

    /// Returns the provisioned workspace path, if any.
    #[must_use]
    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace_path.as_deref()
    }

    /// Returns the active session identifier, if any.
    #[must_use]
    pub const fn active_session(&self) -> Option<SessionId> {
        self.active_session
    }

    /// Returns the append-only stage-result log, oldest first.
    #[must_use]
    pub fn stage_results(&self) -> &[StageResult] {
        &self.stage_results
    }

    /// Returns the testing URL map.
    #[must_use]
    pub const fn testing_urls(&self) -> &BTreeMap<String, String> {
        &self.testing_urls
    }

    /// Returns the frozen manual-mode flag.
    #[must_use]
    pub const fn manual_mode(&self) -> bool {
        self.manual_mode
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest lifecycle timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Appends a stage result to the audit log.
    pub fn record_stage_result(&mut self, result: StageResult, clock: &impl Clock) {
        self.stage_results.push(result);
        self.touch(clock);
    }

    /// Records a testing URL under a stable key (e.g., `"preview"`).
    pub fn record_testing_url(
        &mut self,
        key: impl Into<String>,
        url: impl Into<String>,
        clock: &impl Clock,
    ) {
        self.testing_urls.insert(key.into(), url.into());
        self.touch(clock);
    }

    /// Returns `true` when the log holds a successful entry for `phase`.
    ///
    /// Forward-edge guards consume this: `Analysis → InProgress` and
    /// `InProgress → Testing` require analysis artifacts, `Testing →
    /// CodeReview` requires a green testing stage.
    #[must_use]
    pub fn has_successful_stage(&self, phase: Phase) -> bool {
        self.stage_results
            .iter()
            .any(|entry| entry.phase == Some(phase) && entry.is_success())
    }

    /// Returns `true` when the log holds a successful merge entry.
    #[must_use]
    pub fn has_merge_result(&self) -> bool {
        self.stage_results.iter().any(StageResult::records_merge)
    }

    /// Attaches the provisioned workspace path.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::WorkspaceAlreadyActive`] when a workspace
    /// is already attached; a task owns at most one workspace at a time.
    pub fn attach_workspace(
        &mut self,
        path: PathBuf,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.workspace_path.is_some() {
            return Err(TaskDomainError::WorkspaceAlreadyActive(self.id));
        }
        self.workspace_path = Some(path);
        self.touch(clock);
        Ok(())
    }

    /// Detaches the workspace after removal. A no-op when none is attached.
    pub fn detach_workspace(&mut self, clock: &impl Clock) {
        if self.workspace_path.take().is_some() {
            self.touch(clock);
        }
    }

    /// Attaches the active session.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SessionAlreadyActive`] when a session is
    /// already attached; a task owns at most one active session at a time.
    pub fn attach_session(
        &mut self,
        session_id: SessionId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.active_session.is_some() {
            return Err(TaskDomainError::SessionAlreadyActive(self.id));
        }
        self.active_session = Some(session_id);
        self.touch(clock);
        Ok(())
    }

    /// Detaches the active session. A no-op when none is attached.
    pub fn detach_session(&mut self, clock: &impl Clock) {
        if self.active_session.take().is_some() {
            self.touch(clock);
        }
    }

    /// Overwrites the status and appends its audit entry during a repository
    /// compare-and-swap commit.
    ///
    /// Restricted to crate scope: external callers go through the state
    /// machine service, which validates the edge before committing. The
    /// `updated_at` timestamp is taken from the audit entry so the commit
    /// carries a single consistent time.
    pub(crate) fn commit_status(&mut self, status: TaskStatus, audit: StageResult) {
        self.status = status;
        self.updated_at = audit.recorded_at;
        self.stage_results.push(audit);
    }

    /// Overwrites the status without an audit entry.
    ///
    /// Used by repository adapters to pin the stored status during
    /// non-status updates; never exposed outside the crate.
    pub(crate) const fn force_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Updates the `updated_at` timestamp to the current clock time.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
