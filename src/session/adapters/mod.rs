//! Adapter implementations for the session context.

mod process;
mod scripted;

pub use process::ProcessLauncher;
pub use scripted::{ScriptedEnd, ScriptedLauncher, ScriptedRun};
