//! Task status enum, the legal transition graph, and transition side effects.

use super::ParseTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
///
/// The variants form the nodes of a fixed directed transition graph; edges
/// are declared by [`TaskStatus::can_transition_to`]. [`TaskStatus::Done`]
/// and [`TaskStatus::Cancelled`] are terminal and have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task exists but no phase has started.
    Backlog,
    /// The analysis phase is active.
    Analysis,
    /// The implementation phase is active.
    InProgress,
    /// The testing phase is active.
    Testing,
    /// The review phase is active.
    CodeReview,
    /// Task is halted pending human action; carries a mandatory reason.
    Blocked,
    /// Task completed and merged.
    Done,
    /// Task abandoned before completion.
    Cancelled,
}

/// All task statuses in declaration order.
const ALL_STATUSES: [TaskStatus; 8] = [
    TaskStatus::Backlog,
    TaskStatus::Analysis,
    TaskStatus::InProgress,
    TaskStatus::Testing,
    TaskStatus::CodeReview,
    TaskStatus::Blocked,
    TaskStatus::Done,
    TaskStatus::Cancelled,
];

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Analysis => "analysis",
            Self::InProgress => "in_progress",
            Self::Testing => "testing",
            Self::CodeReview => "code_review",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` when no outgoing transition exists from this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Returns `true` when the declared graph contains an edge to `target`.
    ///
    /// Self-edges are never legal. `Blocked` is reachable from every
    /// non-terminal status, and unblocking may re-enter any non-terminal
    /// working status. Guards on forward edges (recorded artifacts, merge
    /// results) are evaluated by the state machine service, not here.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        if self.is_terminal() || target == self {
            return false;
        }
        // Every non-terminal status may block or cancel.
        if matches!(target, Self::Blocked | Self::Cancelled) {
            return true;
        }
        match self {
            Self::Backlog => matches!(target, Self::Analysis),
            Self::Analysis => matches!(target, Self::InProgress | Self::Backlog),
            Self::InProgress => matches!(target, Self::Testing | Self::Analysis),
            Self::Testing => matches!(target, Self::CodeReview | Self::InProgress),
            Self::CodeReview => {
                matches!(target, Self::Done | Self::Testing | Self::InProgress)
            }
            Self::Blocked => !target.is_terminal(),
            Self::Done | Self::Cancelled => false,
        }
    }

    /// Returns the legal successor statuses in declaration order.
    #[must_use]
    pub fn allowed_successors(self) -> Vec<Self> {
        ALL_STATUSES
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Returns the workflow phase whose session runs while the task holds
    /// this status, if any.
    #[must_use]
    pub const fn phase(self) -> Option<Phase> {
        match self {
            Self::Analysis => Some(Phase::Analysis),
            Self::InProgress => Some(Phase::Implementation),
            Self::Testing => Some(Phase::Testing),
            Self::CodeReview => Some(Phase::Review),
            Self::Backlog | Self::Blocked | Self::Done | Self::Cancelled => None,
        }
    }

    /// Returns the side-effect instructions other components must execute
    /// when a task enters this status.
    ///
    /// The state machine returns these with a committed transition; it never
    /// executes them itself.
    #[must_use]
    pub fn entry_effects(self) -> Vec<SideEffect> {
        match self {
            Self::Backlog => Vec::new(),
            Self::Analysis => vec![
                SideEffect::ProvisionWorkspace,
                SideEffect::SpawnSession(Phase::Analysis),
            ],
            Self::InProgress => vec![
                SideEffect::SyncWorkspace,
                SideEffect::SpawnSession(Phase::Implementation),
            ],
            Self::Testing => vec![
                SideEffect::SyncWorkspace,
                SideEffect::SpawnSession(Phase::Testing),
            ],
            Self::CodeReview => vec![
                SideEffect::SyncWorkspace,
                SideEffect::SpawnSession(Phase::Review),
            ],
            Self::Blocked => vec![SideEffect::StopSession, SideEffect::ReleaseResources],
            Self::Done => vec![SideEffect::RemoveWorkspace, SideEffect::ReleaseResources],
            Self::Cancelled => vec![
                SideEffect::StopSession,
                SideEffect::ReleaseResources,
                SideEffect::RemoveWorkspace,
            ],
        }
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "backlog" => Ok(Self::Backlog),
            "analysis" => Ok(Self::Analysis),
            "in_progress" => Ok(Self::InProgress),
            "testing" => Ok(Self::Testing),
            "code_review" => Ok(Self::CodeReview),
            "blocked" => Ok(Self::Blocked),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named workflow phase with a supervised agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Requirement and design analysis.
    Analysis,
    /// Code implementation.
    Implementation,
    /// Test authoring and execution.
    Testing,
    /// Code review.
    Review,
}

impl Phase {
    /// Returns the canonical phase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Review => "review",
        }
    }

    /// Returns the status a task holds while this phase runs.
    #[must_use]
    pub const fn status(self) -> TaskStatus {
        match self {
            Self::Analysis => TaskStatus::Analysis,
            Self::Implementation => TaskStatus::InProgress,
            Self::Testing => TaskStatus::Testing,
            Self::Review => TaskStatus::CodeReview,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instruction for another component, emitted alongside a committed
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Create the task's isolated worktree and feature branch.
    ProvisionWorkspace,
    /// Optionally fast-forward the workspace base as trunk advances.
    SyncWorkspace,
    /// Spawn the agent session for the given phase.
    SpawnSession(Phase),
    /// Stop the task's active session, if any.
    StopSession,
    /// Merge the feature branch into trunk.
    MergeWorkspace,
    /// Remove the worktree and delete the feature branch.
    RemoveWorkspace,
    /// Release every lease the task holds.
    ReleaseResources,
}
