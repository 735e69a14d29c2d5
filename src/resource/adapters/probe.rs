//! Port-probe adapters.

use crate::resource::ports::PortProbe;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Mutex;

/// Production probe: a port is free when a loopback bind succeeds.
///
/// The listener is dropped immediately after the check, so the port is
/// only *likely* free at spawn time; the registry's reservation set is what
/// prevents two tasks from racing to the same port.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortProbe;

impl TcpPortProbe {
    /// Creates a TCP probe.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PortProbe for TcpPortProbe {
    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
    }
}

/// Scripted probe for tests: every port is free unless marked busy.
#[derive(Debug, Default)]
pub struct FakePortProbe {
    busy: Mutex<HashSet<u16>>,
}

impl FakePortProbe {
    /// Creates a probe with every port free.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a port as occupied by some external process.
    pub fn occupy(&self, port: u16) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.insert(port);
        }
    }

    /// Frees a previously occupied port.
    pub fn vacate(&self, port: u16) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.remove(&port);
        }
    }
}

impl PortProbe for FakePortProbe {
    fn is_free(&self, port: u16) -> bool {
        self.busy
            .lock()
            .map(|busy| !busy.contains(&port))
            .unwrap_or(false)
    }
}
