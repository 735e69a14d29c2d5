//! Task lifecycle management for Brunel.
//!
//! This module owns the authoritative task status record and the fixed
//! transition graph that governs it. Status only ever changes through
//! compare-and-set semantics: every caller supplies the status it believes
//! is current, and the loser of a concurrent race receives a conflict
//! instead of silently overwriting the winner. Each committed or rejected
//! transition appends an entry to the task's append-only stage-result log,
//! which is the sole durable audit trail. The module follows hexagonal
//! architecture:
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
