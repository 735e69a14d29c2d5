//! Session supervision: spawn, monitor, retry, stop.

use crate::config::{CommandContext, ProjectConfig};
use crate::controller::events::{PhaseOutcome, SessionEvent};
use crate::session::domain::{Session, SessionError, SessionKind, SessionState, Transcript};
use crate::session::ports::{
    AgentLauncher, AgentProcess, LaunchSpec, SessionCleanup, SessionResult,
};
use crate::task::domain::{EventId, Phase, SessionId, Task, TaskId};
use mockable::Clock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How one launch attempt ended.
enum AttemptEnd {
    /// Clean exit or completion marker.
    Completed,
    /// The agent finished but reported phase failure.
    PhaseFailed {
        reason: String,
    },
    /// Unexpected exit or launch failure; retried within the budget.
    Crashed {
        detail: String,
    },
    /// The attempt exceeded the session timeout.
    TimedOut,
    /// A stop was requested.
    Stopped,
}

struct ActiveSession {
    session: Arc<Mutex<Session>>,
    transcript: Arc<Transcript>,
    stop: watch::Sender<bool>,
    monitor: JoinHandle<()>,
}

struct MonitorContext {
    task_id: TaskId,
    phase: Phase,
    session_id: SessionId,
    session: Arc<Mutex<Session>>,
    transcript: Arc<Transcript>,
    spec: LaunchSpec,
    stop: watch::Receiver<bool>,
}

struct Inner<L, C>
where
    L: AgentLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    launcher: Arc<L>,
    clock: Arc<C>,
    config: Arc<ProjectConfig>,
    cleanup: Arc<dyn SessionCleanup>,
    events: mpsc::UnboundedSender<SessionEvent>,
    active: Mutex<HashMap<TaskId, ActiveSession>>,
}

/// Supervises one agent process per active task phase.
///
/// Each spawned session gets a dedicated monitor task that streams output
/// into the transcript and watches for the first of: process exit, the
/// completion marker appearing in the workdir, the session timeout, or a
/// stop request. Unexpected exits are relaunched with exponential backoff
/// until the retry budget is exhausted. Every interactive exit path
/// releases the task's resource leases and emits exactly one
/// [`SessionEvent`].
pub struct SessionSupervisor<L, C>
where
    L: AgentLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<Inner<L, C>>,
}

impl<L, C> Clone for SessionSupervisor<L, C>
where
    L: AgentLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L, C> SessionSupervisor<L, C>
where
    L: AgentLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a supervisor emitting session events on `events`.
    #[must_use]
    pub fn new(
        launcher: Arc<L>,
        clock: Arc<C>,
        config: Arc<ProjectConfig>,
        cleanup: Arc<dyn SessionCleanup>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                clock,
                config,
                cleanup,
                events,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Spawns the phase session for a task and starts its monitor.
    ///
    /// The phase command template is rendered against the task, and the
    /// process runs in `workdir` (the task's worktree). The caller supplies
    /// `session_id` so the task record can reference the session before the
    /// monitor starts; completion is reported asynchronously via a
    /// [`SessionEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyRunning`] when the task already has
    /// an active session, or [`SessionError::Config`] when no command is
    /// configured for the phase or the template fails to render.
    pub fn spawn(
        &self,
        task: &Task,
        phase: Phase,
        workdir: &Path,
        session_id: SessionId,
    ) -> SessionResult<()> {
        let context = CommandContext::for_task(task, phase, workdir);
        let command = self.inner.config.command_for(phase)?.render(&context)?;
        let spec = LaunchSpec {
            program: command.program,
            args: command.args,
            workdir: workdir.to_path_buf(),
        };

        let record = Session::new(
            session_id,
            task.id(),
            phase,
            SessionKind::Interactive,
            &*self.inner.clock,
        );
        let session = Arc::new(Mutex::new(record));
        let transcript = Arc::new(Transcript::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = MonitorContext {
            task_id: task.id(),
            phase,
            session_id,
            session: Arc::clone(&session),
            transcript: Arc::clone(&transcript),
            spec,
            stop: stop_rx,
        };

        let mut active = self.lock_active()?;
        if active.contains_key(&task.id()) {
            return Err(SessionError::AlreadyRunning(task.id()));
        }
        let monitor = tokio::spawn(Inner::monitor(Arc::clone(&self.inner), ctx));
        active.insert(
            task.id(),
            ActiveSession {
                session,
                transcript,
                stop: stop_tx,
                monitor,
            },
        );
        info!(task_id = %task.id(), %session_id, %phase, "session spawned");
        Ok(())
    }

    /// Stops the task's active session: graceful termination, a bounded
    /// grace period, then a kill. Waits until the monitor has finished its
    /// cleanup and emitted the terminal event.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] when the task has no active
    /// session.
    pub async fn stop(&self, task_id: TaskId) -> SessionResult<()> {
        let entry = self
            .lock_active()?
            .remove(&task_id)
            .ok_or(SessionError::NotFound(task_id))?;
        drop(entry.stop.send(true));
        if entry.monitor.await.is_err() {
            warn!(%task_id, "session monitor panicked");
        }
        Ok(())
    }

    /// Runs a fire-and-forget helper invocation.
    ///
    /// The process output is captured until EOF or the session timeout,
    /// then the process is force-terminated. Ephemeral sessions are never
    /// registered, keep no [`Session`] record, and never touch the
    /// resource registry; the captured lines are their only trace.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SpawnFailed`] when the process cannot be
    /// launched.
    pub async fn run_ephemeral(
        &self,
        task_id: TaskId,
        spec: LaunchSpec,
    ) -> SessionResult<Vec<String>> {
        debug!(%task_id, program = %spec.program, "running ephemeral session");
        let mut process = self.inner.launcher.launch(&spec).await?;
        let mut lines = Vec::new();
        let deadline = tokio::time::sleep(self.inner.config.session_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                line = process.next_line() => match line {
                    Some(entry) => lines.push(entry),
                    None => break,
                },
                () = &mut deadline => break,
            }
        }
        drop(process.kill().await);
        drop(process.wait().await);
        Ok(lines)
    }

    /// Returns the transcript of the task's active session.
    #[must_use]
    pub fn transcript(&self, task_id: TaskId) -> Option<Arc<Transcript>> {
        self.inner
            .active
            .lock()
            .ok()
            .and_then(|active| active.get(&task_id).map(|e| Arc::clone(&e.transcript)))
    }

    /// Returns a snapshot of the task's active session record.
    #[must_use]
    pub fn session(&self, task_id: TaskId) -> Option<Session> {
        self.inner.active.lock().ok().and_then(|active| {
            active
                .get(&task_id)
                .and_then(|e| e.session.lock().ok().map(|s| s.clone()))
        })
    }

    /// Returns `true` when the task has an active session.
    #[must_use]
    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.inner
            .active
            .lock()
            .is_ok_and(|active| active.contains_key(&task_id))
    }

    fn lock_active(
        &self,
    ) -> SessionResult<std::sync::MutexGuard<'_, HashMap<TaskId, ActiveSession>>> {
        self.inner
            .active
            .lock()
            .map_err(|_| SessionError::Internal("session table lock poisoned".to_owned()))
    }
}

impl<L, C> Inner<L, C>
where
    L: AgentLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Drives one session to its terminal outcome, retrying crashed
    /// attempts within the budget.
    async fn monitor(self: Arc<Self>, mut ctx: MonitorContext) {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            if let Ok(mut session) = ctx.session.lock() {
                session.begin_attempt();
            }
            match self.run_attempt(&mut ctx).await {
                AttemptEnd::Completed => break PhaseOutcome::Succeeded,
                AttemptEnd::PhaseFailed { reason } => break PhaseOutcome::Failed { reason },
                AttemptEnd::Stopped => break PhaseOutcome::Terminated,
                AttemptEnd::TimedOut => {
                    break PhaseOutcome::Crashed {
                        reason: format!(
                            "session timed out after {:?}",
                            self.config.session_timeout
                        ),
                    };
                }
                AttemptEnd::Crashed { detail } => {
                    if attempt >= max_attempts {
                        break PhaseOutcome::Crashed {
                            reason: format!(
                                "retry budget exhausted after {attempt} attempts: {detail}"
                            ),
                        };
                    }
                    warn!(task_id = %ctx.task_id, attempt, %detail, "session crashed, retrying");
                    tokio::time::sleep(self.config.retry.delay_before(attempt + 1)).await;
                }
            }
        };
        self.finish(&ctx, outcome);
    }

    /// Launches the process and watches it until one terminal condition
    /// fires: EOF + exit, completion marker, timeout, or stop.
    async fn run_attempt(&self, ctx: &mut MonitorContext) -> AttemptEnd {
        let mut process = match self.launcher.launch(&ctx.spec).await {
            Ok(process) => process,
            Err(err) => {
                return AttemptEnd::Crashed {
                    detail: err.to_string(),
                };
            }
        };

        let marker_path = ctx.spec.workdir.join(&self.config.completion_marker);
        let mut marker = tokio::time::interval(self.config.marker_poll_interval);
        let timeout = tokio::time::sleep(self.config.session_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                line = process.next_line() => match line {
                    Some(entry) => ctx.transcript.append(entry),
                    None => return self.classify_exit(ctx, process.as_mut()).await,
                },
                _ = marker.tick() => {
                    if matches!(tokio::fs::try_exists(&marker_path).await, Ok(true)) {
                        debug!(task_id = %ctx.task_id, "completion marker found");
                        drop(tokio::fs::remove_file(&marker_path).await);
                        self.shutdown(process.as_mut()).await;
                        return AttemptEnd::Completed;
                    }
                },
                () = &mut timeout => {
                    warn!(task_id = %ctx.task_id, "session timed out");
                    self.shutdown(process.as_mut()).await;
                    return AttemptEnd::TimedOut;
                },
                changed = ctx.stop.changed() => {
                    if changed.is_err() || *ctx.stop.borrow() {
                        self.shutdown(process.as_mut()).await;
                        return AttemptEnd::Stopped;
                    }
                },
            }
        }
    }

    /// Maps the exit code of a finished process to an attempt outcome.
    ///
    /// Exit code 0 completes the phase; exit code 1 is the agent's signal
    /// that it ran cleanly but the phase did not pass. Anything else is an
    /// unexpected exit.
    async fn classify_exit(
        &self,
        ctx: &MonitorContext,
        process: &mut dyn AgentProcess,
    ) -> AttemptEnd {
        match process.wait().await {
            Ok(Some(0)) => AttemptEnd::Completed,
            Ok(Some(1)) => AttemptEnd::PhaseFailed {
                reason: ctx
                    .transcript
                    .last_line()
                    .unwrap_or_else(|| "agent reported phase failure".to_owned()),
            },
            Ok(code) => AttemptEnd::Crashed {
                detail: format!("agent exited unexpectedly with code {code:?}"),
            },
            Err(err) => AttemptEnd::Crashed {
                detail: err.to_string(),
            },
        }
    }

    /// Graceful wind-down: terminate, wait out the grace period, then
    /// kill.
    async fn shutdown(&self, process: &mut dyn AgentProcess) {
        if process.terminate().await.is_ok()
            && tokio::time::timeout(self.config.grace_period, process.wait())
                .await
                .is_ok()
        {
            return;
        }
        drop(process.kill().await);
        drop(process.wait().await);
    }

    /// Shared exit path: finalise the record, release leases, deregister,
    /// and emit the terminal event.
    fn finish(&self, ctx: &MonitorContext, outcome: PhaseOutcome) {
        let state = match &outcome {
            PhaseOutcome::Succeeded | PhaseOutcome::Failed { .. } => SessionState::Completed,
            PhaseOutcome::Crashed { .. } => SessionState::Failed,
            PhaseOutcome::Terminated => SessionState::Terminated,
        };
        if let Ok(mut session) = ctx.session.lock() {
            session.finish(state, &*self.clock);
        }

        self.cleanup.release_task(ctx.task_id);

        if let Ok(mut active) = self.active.lock() {
            let matches_current = active
                .get(&ctx.task_id)
                .and_then(|e| e.session.lock().ok().map(|s| s.id()))
                .is_some_and(|id| id == ctx.session_id);
            if matches_current {
                active.remove(&ctx.task_id);
            }
        }

        info!(task_id = %ctx.task_id, session_id = %ctx.session_id, ?state, "session finished");
        let event = SessionEvent {
            event_id: EventId::new(),
            session_id: ctx.session_id,
            task_id: ctx.task_id,
            phase: ctx.phase,
            outcome,
        };
        if self.events.send(event).is_err() {
            debug!(task_id = %ctx.task_id, "event receiver dropped");
        }
    }
}
