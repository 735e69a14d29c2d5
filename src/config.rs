//! Frozen per-project configuration and phase command templates.
//!
//! Configuration is read once when a task starts and the task carries its
//! copy for life; later edits only affect tasks started afterwards. Phase
//! commands are rendered from templates so operators can interpolate the
//! task id, branch, and workspace path into agent invocations.

use crate::resource::services::PortRange;
use crate::task::domain::{Phase, Task};
use minijinja::Environment;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No command template is configured for the phase.
    #[error("no command template configured for phase {0}")]
    MissingPhaseCommand(Phase),
    /// A command template failed to render.
    #[error("failed to render command template: {0}")]
    Template(#[from] minijinja::Error),
}

/// Retry policy for supervised sessions that exit unexpectedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Total launch attempts, including the first.
    pub max_attempts: u32,
    /// Backoff delay before the second attempt; doubles per attempt.
    pub base_delay: Duration,
}

impl RetryBudget {
    /// Creates a retry budget.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Returns the backoff delay preceding the given attempt (1-based).
    #[must_use]
    pub fn delay_before(self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

/// Template context available to phase command templates.
#[derive(Debug, Clone, Serialize)]
pub struct CommandContext {
    /// Task identifier.
    pub task_id: String,
    /// Task title.
    pub title: String,
    /// Feature branch name.
    pub branch: String,
    /// Phase being started.
    pub phase: String,
    /// Workspace (worktree) path the session runs in.
    pub workspace: String,
}

impl CommandContext {
    /// Builds the context for spawning a phase session of `task` in
    /// `workdir`.
    #[must_use]
    pub fn for_task(task: &Task, phase: Phase, workdir: &Path) -> Self {
        Self {
            task_id: task.id().to_string(),
            title: task.title().to_owned(),
            branch: task.branch_name().as_str().to_owned(),
            phase: phase.to_string(),
            workspace: workdir.display().to_string(),
        }
    }
}

/// A rendered, ready-to-launch agent command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    /// Executable to launch.
    pub program: String,
    /// Rendered arguments, in order.
    pub args: Vec<String>,
}

/// An agent command line with minijinja placeholders in its arguments.
///
/// Both the program and each argument are rendered against
/// [`CommandContext`], so templates like `--branch {{ branch }}` expand per
/// task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl CommandTemplate {
    /// Creates a template from a program and argument templates.
    #[must_use]
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Renders the command line for one task and phase.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] when a placeholder fails to
    /// render.
    pub fn render(&self, context: &CommandContext) -> Result<RenderedCommand, ConfigError> {
        let env = Environment::new();
        let program = env.render_str(&self.program, context)?;
        let args = self
            .args
            .iter()
            .map(|arg| env.render_str(arg, context))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RenderedCommand { program, args })
    }
}

/// Per-project orchestration settings, frozen per task at start.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// When `true`, phase completion halts for human review instead of
    /// advancing automatically.
    pub manual_mode: bool,
    /// Agent command template per phase.
    pub phase_commands: HashMap<Phase, CommandTemplate>,
    /// File name whose appearance in the workdir marks phase completion.
    pub completion_marker: String,
    /// Hard wall-clock limit for one session attempt.
    pub session_timeout: Duration,
    /// Time allowed for graceful shutdown before a session is killed.
    pub grace_period: Duration,
    /// Poll cadence for the completion marker.
    pub marker_poll_interval: Duration,
    /// Retry policy for unexpected session exits.
    pub retry: RetryBudget,
    /// Preferred port range and hard ceiling for allocation.
    pub ports: PortRange,
    /// Directory under which per-task worktrees are created.
    pub workspaces_root: PathBuf,
}

impl ProjectConfig {
    /// Returns the command template for `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPhaseCommand`] when the phase has no
    /// configured command.
    pub fn command_for(&self, phase: Phase) -> Result<&CommandTemplate, ConfigError> {
        self.phase_commands
            .get(&phase)
            .ok_or(ConfigError::MissingPhaseCommand(phase))
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            manual_mode: false,
            phase_commands: HashMap::new(),
            completion_marker: ".phase-complete".to_owned(),
            session_timeout: Duration::from_secs(30 * 60),
            grace_period: Duration::from_secs(10),
            marker_poll_interval: Duration::from_millis(500),
            retry: RetryBudget::new(3, Duration::from_secs(1)),
            ports: PortRange::new(3000, 3999, 4999),
            workspaces_root: PathBuf::from("workspaces"),
        }
    }
}
