//! Task-scoped leasing of scarce shared resources.
//!
//! The only cross-task shared resources in the engine are listen ports and
//! named exclusive locks. Leases are scoped to a task and released
//! idempotently: workspace removal, terminal task statuses, and session
//! stop/cancel/timeout all call [`services::ResourceRegistry::release`],
//! and calling it an arbitrary number of times is safe. The allocation
//! mutex is held only across the scan-and-reserve step, never across a
//! process spawn. The module follows hexagonal architecture:
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
