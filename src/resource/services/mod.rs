//! Application services for the resource context.

mod registry;

pub use registry::{PortRange, ResourceError, ResourceRegistry, ResourceResult};
