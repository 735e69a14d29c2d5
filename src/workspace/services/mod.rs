//! Application services for the workspace context.

mod manager;

pub use manager::WorkspaceManager;
