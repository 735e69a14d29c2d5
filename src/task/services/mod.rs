//! Application services for the task context.

mod state_machine;

pub use state_machine::{
    TaskStateMachine, TransitionError, TransitionOutcome, TransitionRequest, TransitionResult,
};
