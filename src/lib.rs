//! Brunel: a task orchestration and session-lifecycle engine.
//!
//! Brunel drives a fleet of independent tasks through a fixed multi-phase
//! development workflow (analysis → implementation → testing → review →
//! merge) by supervising one external coding-agent process per active
//! phase, each bound to an isolated branch-scoped git worktree.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external collaborators
//! - **Adapters**: Concrete implementations of ports (git subprocess,
//!   tokio process supervision, in-memory persistence)
//! - **Services**: Orchestration layered over ports and domain types
//!
//! # Modules
//!
//! - [`task`]: Authoritative task status record, the legal transition graph,
//!   and the compare-and-set state machine driving it
//! - [`workspace`]: Isolated branch-scoped worktree lifecycle (create, sync,
//!   merge, remove)
//! - [`session`]: Supervised external agent processes with streamed output,
//!   timeouts, and retry budgets
//! - [`resource`]: Task-scoped leases over scarce shared resources (ports,
//!   named locks) with idempotent release
//! - [`controller`]: The top-level loop deciding whether phase completion
//!   advances a task automatically or waits for a human
//! - [`config`]: Per-project configuration frozen at task start
//! - [`logging`]: Tracing subscriber initialisation

pub mod config;
pub mod controller;
pub mod logging;
pub mod resource;
pub mod session;
pub mod task;
pub mod workspace;
