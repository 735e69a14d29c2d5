//! Tracing subscriber initialisation.
//!
//! Diagnostics only: the durable record of what happened to a task is its
//! stage-result audit trail, not the log stream.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialises the global tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`, and writes compact output to
/// stderr. Calling this twice panics, as the global subscriber may only be
/// set once; embedders that install their own subscriber should skip it.
///
/// # Panics
///
/// Panics when a global subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
