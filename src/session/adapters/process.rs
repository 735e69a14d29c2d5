//! Subprocess launcher backed by `tokio::process`.

use crate::session::domain::SessionError;
use crate::session::ports::{AgentLauncher, AgentProcess, LaunchSpec, SessionResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::debug;

/// Launches real agent subprocesses with piped standard streams.
///
/// stdout and stderr are forwarded line-by-line into one merged channel by
/// two background tasks, so the supervisor reads a single ordered stream.
/// stdin is piped: graceful termination closes it, which well-behaved
/// agents treat as a wind-down request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Creates a launcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> SessionResult<Box<dyn AgentProcess>> {
        debug!(program = %spec.program, workdir = %spec.workdir.display(), "launching agent");
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SessionError::SpawnFailed {
                program: spec.program.clone(),
                detail: err.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        // The receiver reaches EOF once both forwarders finish.
        drop(tx);

        let stdin = child.stdin.take();
        Ok(Box::new(SpawnedAgent {
            child,
            stdin,
            lines: rx,
        }))
    }
}

/// Forwards one output stream into the merged line channel.
async fn forward_lines(stream: impl AsyncRead + Unpin, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

struct SpawnedAgent {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<String>,
}

#[async_trait]
impl AgentProcess for SpawnedAgent {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> SessionResult<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|err| SessionError::Internal(err.to_string()))?;
        Ok(status.code())
    }

    async fn terminate(&mut self) -> SessionResult<()> {
        // Closing stdin signals the agent to wind down.
        drop(self.stdin.take());
        Ok(())
    }

    async fn kill(&mut self) -> SessionResult<()> {
        self.child
            .kill()
            .await
            .map_err(|err| SessionError::Internal(err.to_string()))
    }
}
