//! Supervised agent session lifecycle for Brunel.
//!
//! A session is one external coding-agent process working one phase of one
//! task. The supervisor launches it through a port, streams its output into
//! an in-memory transcript, watches for completion (process exit, a
//! completion-marker file, or a timeout), retries unexpected exits within a
//! budget, and guarantees resource-lease release on every exit path. The
//! module follows hexagonal architecture:
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
