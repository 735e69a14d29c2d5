//! Stage-result audit entries appended to a task's log.

use super::Phase;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Details key under which a successful merge records its commit id.
///
/// The `CodeReview → Done` guard checks for an entry carrying this key.
pub const MERGE_COMMIT_KEY: &str = "merge_commit";

/// Builds the details payload recording a successful merge commit.
#[must_use]
pub fn merge_details(commit: impl Into<String>) -> Value {
    serde_json::json!({ MERGE_COMMIT_KEY: commit.into() })
}

/// Outcome classification of a stage-result entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage or transition succeeded.
    Success,
    /// The stage or transition failed.
    Failure,
    /// Informational entry (e.g., a halted event awaiting human action).
    Info,
}

impl StageStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in a task's append-only stage-result log.
///
/// The log is the sole durable audit trail: every committed transition,
/// every rejected transition, and every recorded workspace or session
/// failure appends exactly one entry. Entries are never updated or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Outcome classification.
    pub status: StageStatus,
    /// One-line human-readable summary.
    pub summary: String,
    /// Structured detail payload (conflicting paths, exit codes, reasons).
    pub details: Value,
    /// Workflow phase the entry belongs to (None for cross-phase entries
    /// such as transition audits).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a stage result stamped with the current clock time.
    #[must_use]
    pub fn new(
        status: StageStatus,
        summary: impl Into<String>,
        details: Value,
        clock: &impl Clock,
    ) -> Self {
        Self {
            status,
            summary: summary.into(),
            details,
            phase: None,
            recorded_at: clock.utc(),
        }
    }

    /// Creates a success entry with no structured details.
    #[must_use]
    pub fn success(summary: impl Into<String>, clock: &impl Clock) -> Self {
        Self::new(StageStatus::Success, summary, Value::Null, clock)
    }

    /// Creates a failure entry with no structured details.
    #[must_use]
    pub fn failure(summary: impl Into<String>, clock: &impl Clock) -> Self {
        Self::new(StageStatus::Failure, summary, Value::Null, clock)
    }

    /// Attributes the entry to a workflow phase.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Replaces the structured details payload.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Returns `true` when the entry records a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, StageStatus::Success)
    }

    /// Returns `true` when the entry records a successful merge.
    #[must_use]
    pub fn records_merge(&self) -> bool {
        self.is_success() && self.details.get(MERGE_COMMIT_KEY).is_some()
    }
}
