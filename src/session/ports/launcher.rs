//! Agent process launch and control contract.

use crate::session::domain::SessionError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// A fully rendered agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable to launch.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Working directory the process runs in (the task's worktree).
    pub workdir: PathBuf,
}

/// A running agent process under supervision.
///
/// Callers own the process exclusively; all methods take `&mut self` and
/// are never invoked concurrently. `next_line` must be cancellation safe,
/// as the supervisor polls it inside a `select!` loop.
#[async_trait]
pub trait AgentProcess: Send {
    /// Returns the next output line (stdout and stderr merged), or `None`
    /// once the process has closed its output.
    async fn next_line(&mut self) -> Option<String>;

    /// Waits for the process to exit and returns its exit code (`None`
    /// when it was killed by a signal).
    async fn wait(&mut self) -> SessionResult<Option<i32>>;

    /// Requests a graceful wind-down. The process may take up to the
    /// caller's grace period to exit; callers follow up with
    /// [`AgentProcess::kill`] when it does not.
    async fn terminate(&mut self) -> SessionResult<()>;

    /// Forcibly kills the process.
    async fn kill(&mut self) -> SessionResult<()>;
}

/// Launches agent processes.
///
/// The production adapter spawns real subprocesses via `tokio::process`;
/// tests substitute a scripted implementation.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    /// Launches the agent described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SpawnFailed`] when the process cannot be
    /// started.
    async fn launch(&self, spec: &LaunchSpec) -> SessionResult<Box<dyn AgentProcess>>;
}
