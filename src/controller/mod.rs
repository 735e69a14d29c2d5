//! Mode-aware task advancement for Brunel.
//!
//! The controller is the single consumer of session events. It decides,
//! per task, whether a finished phase advances the task automatically or
//! halts for human review, drives the state machine with bounded
//! compare-and-set retries, executes the side-effect instructions each
//! committed transition returns, and publishes task notifications for
//! observers.

pub mod events;
pub mod service;

pub use events::{PhaseOutcome, SessionEvent, TaskNotification};
pub use service::{ControllerError, ModeController};

#[cfg(test)]
mod tests;
