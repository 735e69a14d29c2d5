//! Isolated, branch-scoped workspace lifecycle for Brunel.
//!
//! Every task owns at most one workspace: a git worktree checked out on a
//! feature branch cut from trunk, at a path derived deterministically from
//! the task id. Workspaces are created when the first phase needing code
//! access starts and destroyed after a successful merge or on task
//! cancellation. All VCS commands in the engine flow through this module's
//! port; no other component shells out to git. The module follows
//! hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
