//! Validated branch-name value object for task workspaces.

use super::TaskDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a validated branch name.
///
/// Git imposes no hard limit, but worktree paths derive from branch names,
/// so the cap keeps derived filesystem paths well inside platform limits.
const MAX_BRANCH_NAME_LENGTH: usize = 200;

/// Validated git branch name for a task's feature branch.
///
/// Branch names must be non-empty after trimming, must not contain
/// whitespace, colons, or `..`, and must not exceed
/// `MAX_BRANCH_NAME_LENGTH` characters.
///
/// # Examples
///
///     use brunel::task::domain::BranchName;
///
///     let name = BranchName::new("task/fix-login").expect("valid");
///     assert_eq!(name.as_str(), "task/fix-login");
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidBranchName`] when the value is
    /// empty, contains whitespace, a colon, or `..`, or exceeds the length
    /// limit.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim();

        if Self::is_invalid_branch_name(normalized) {
            return Err(TaskDomainError::InvalidBranchName(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Validates branch name constraints per `git-check-ref-format`.
    fn is_invalid_branch_name(name: &str) -> bool {
        let is_empty = name.is_empty();
        let contains_forbidden = name.contains(':')
            || name.contains("..")
            || name.chars().any(char::is_whitespace);
        let exceeds_length_limit = name.len() > MAX_BRANCH_NAME_LENGTH;

        is_empty || contains_forbidden || exceeds_length_limit
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
