//! Domain types for the session context.

mod error;
mod session;
mod transcript;

pub use error::SessionError;
pub use session::{Session, SessionKind, SessionState};
pub use transcript::Transcript;
