//! Port contracts for the resource context.

/// Probe deciding whether a TCP port is free on the local host.
///
/// The production adapter attempts a bind; it never terminates a process
/// occupying a port. Tests substitute a scripted implementation.
pub trait PortProbe: Send + Sync {
    /// Returns `true` when the port can currently be bound.
    fn is_free(&self, port: u16) -> bool;
}
