//! Port contracts for the session context.

mod cleanup;
mod launcher;

pub use cleanup::SessionCleanup;
pub use launcher::{AgentLauncher, AgentProcess, LaunchSpec, SessionResult};
