//! Domain types for the resource context.

use crate::task::domain::{LeaseId, TaskId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A scarce shared resource that can be leased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeasedResource {
    /// A TCP listen port.
    Port(u16),
    /// A named exclusive lock.
    Lock(String),
}

impl fmt::Display for LeasedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(port) => write!(f, "port {port}"),
            Self::Lock(name) => write!(f, "lock {name:?}"),
        }
    }
}

/// A temporarily-owned shared resource scoped to one task.
///
/// Leases are created when a phase needs a shared resource and released no
/// later than phase exit, a terminal task status, or explicit cancellation,
/// whichever comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLease {
    id: LeaseId,
    resource: LeasedResource,
    task_id: TaskId,
    acquired_at: DateTime<Utc>,
    ttl: Option<Duration>,
}

impl ResourceLease {
    /// Creates a lease stamped with the current clock time.
    #[must_use]
    pub fn new(
        resource: LeasedResource,
        task_id: TaskId,
        ttl: Option<Duration>,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: LeaseId::new(),
            resource,
            task_id,
            acquired_at: clock.utc(),
            ttl,
        }
    }

    /// Returns the lease identifier.
    #[must_use]
    pub const fn id(&self) -> LeaseId {
        self.id
    }

    /// Returns the leased resource.
    #[must_use]
    pub const fn resource(&self) -> &LeasedResource {
        &self.resource
    }

    /// Returns the leased port when the resource is a port.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        match self.resource {
            LeasedResource::Port(port) => Some(port),
            LeasedResource::Lock(_) => None,
        }
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the acquisition time.
    #[must_use]
    pub const fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Returns the optional time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}
