//! Application services for the session context.

mod supervisor;

pub use supervisor::SessionSupervisor;
