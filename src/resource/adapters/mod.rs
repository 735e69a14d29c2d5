//! Adapter implementations for the resource context.

mod probe;

pub use probe::{FakePortProbe, TcpPortProbe};
