//! Scripted launcher for deterministic supervisor tests.

use crate::session::domain::SessionError;
use crate::session::ports::{AgentLauncher, AgentProcess, LaunchSpec, SessionResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// How a scripted agent behaves once its lines are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedEnd {
    /// Close output and exit with this code.
    Exit(i32),
    /// Keep running until terminated or killed.
    Hang,
}

/// One scripted agent run: output lines, then an end behaviour.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    /// Lines emitted before the end behaviour applies.
    pub lines: Vec<String>,
    /// Behaviour after the lines are exhausted.
    pub end: ScriptedEnd,
}

impl ScriptedRun {
    /// Creates a run that emits `lines` then exits with `code`.
    #[must_use]
    pub fn exiting(lines: impl IntoIterator<Item = impl Into<String>>, code: i32) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            end: ScriptedEnd::Exit(code),
        }
    }

    /// Creates a run that emits `lines` then hangs until stopped.
    #[must_use]
    pub fn hanging(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            end: ScriptedEnd::Hang,
        }
    }
}

#[derive(Debug, Default)]
struct ScriptedStats {
    launches: AtomicU32,
    terminates: AtomicU32,
    kills: AtomicU32,
}

/// Launcher that replays queued [`ScriptedRun`]s in order.
///
/// Each launch consumes the next queued run; launching with an empty queue
/// fails, which doubles as the crash script for retry tests. Counters
/// record how often processes were launched, terminated, and killed.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    runs: Mutex<VecDeque<ScriptedRun>>,
    stats: Arc<ScriptedStats>,
}

impl ScriptedLauncher {
    /// Creates a launcher with an empty run queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next run to replay.
    pub fn push_run(&self, run: ScriptedRun) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push_back(run);
        }
    }

    /// Returns how many processes were launched.
    #[must_use]
    pub fn launches(&self) -> u32 {
        self.stats.launches.load(Ordering::SeqCst)
    }

    /// Returns how many processes received a graceful terminate.
    #[must_use]
    pub fn terminates(&self) -> u32 {
        self.stats.terminates.load(Ordering::SeqCst)
    }

    /// Returns how many processes were killed.
    #[must_use]
    pub fn kills(&self) -> u32 {
        self.stats.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentLauncher for ScriptedLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> SessionResult<Box<dyn AgentProcess>> {
        let run = self
            .runs
            .lock()
            .ok()
            .and_then(|mut runs| runs.pop_front())
            .ok_or_else(|| SessionError::SpawnFailed {
                program: spec.program.clone(),
                detail: "no scripted run queued".to_owned(),
            })?;
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedProcess {
            lines: run.lines.into(),
            end: run.end,
            stopped: false,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedProcess {
    lines: VecDeque<String>,
    end: ScriptedEnd,
    stopped: bool,
    stats: Arc<ScriptedStats>,
}

#[async_trait]
impl AgentProcess for ScriptedProcess {
    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.lines.pop_front() {
            return Some(line);
        }
        match self.end {
            ScriptedEnd::Exit(_) => None,
            // Output stays open until the supervisor stops the process.
            ScriptedEnd::Hang => {
                if self.stopped {
                    None
                } else {
                    std::future::pending().await
                }
            }
        }
    }

    async fn wait(&mut self) -> SessionResult<Option<i32>> {
        if self.stopped {
            return Ok(None);
        }
        match self.end {
            ScriptedEnd::Exit(code) => Ok(Some(code)),
            ScriptedEnd::Hang => std::future::pending().await,
        }
    }

    async fn terminate(&mut self) -> SessionResult<()> {
        self.stats.terminates.fetch_add(1, Ordering::SeqCst);
        self.stopped = true;
        Ok(())
    }

    async fn kill(&mut self) -> SessionResult<()> {
        self.stats.kills.fetch_add(1, Ordering::SeqCst);
        self.stopped = true;
        Ok(())
    }
}
