//! Task-scoped lease registry for ports and named locks.

use crate::resource::domain::{LeasedResource, ResourceLease};
use crate::resource::ports::PortProbe;
use crate::session::ports::SessionCleanup;
use crate::task::domain::TaskId;
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Inclusive port range with an expansion ceiling.
///
/// Allocation scans `start..=end` first; when the preferred range is
/// exhausted the scan expands through `end+1..=ceiling` before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First port of the preferred range.
    pub start: u16,
    /// Last port of the preferred range.
    pub end: u16,
    /// Hard upper bound for expanded scans.
    pub ceiling: u16,
}

impl PortRange {
    /// Creates a range, clamping so `start <= end <= ceiling` holds.
    #[must_use]
    pub const fn new(start: u16, end: u16, ceiling: u16) -> Self {
        let end = if end < start { start } else { end };
        let ceiling = if ceiling < end { end } else { ceiling };
        Self {
            start,
            end,
            ceiling,
        }
    }

    /// Iterates the preferred range followed by the expansion window.
    fn candidates(self) -> impl Iterator<Item = u16> {
        self.start..=self.ceiling
    }
}

/// Result type for registry operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Errors returned by the resource registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// No free port remains in the range or its expansion window.
    ///
    /// Another task's lease is never reclaimed to satisfy a request.
    #[error("no free port in {start}..={end} (ceiling {ceiling})")]
    Exhausted {
        /// First port scanned.
        start: u16,
        /// Last preferred port.
        end: u16,
        /// Expansion ceiling.
        ceiling: u16,
    },

    /// The named lock is already leased by another task.
    #[error("lock {name:?} is held by task {owner}")]
    LockHeld {
        /// Requested lock name.
        name: String,
        /// Task currently holding the lock.
        owner: TaskId,
    },

    /// The allocation mutex was poisoned by a panicking holder.
    #[error("resource registry lock poisoned")]
    Poisoned,
}

#[derive(Debug, Default)]
struct RegistryState {
    leases: HashMap<TaskId, Vec<ResourceLease>>,
    reserved_ports: HashSet<u16>,
    held_locks: HashMap<String, TaskId>,
}

/// Leases scarce shared resources (ports, named locks) scoped per task.
///
/// The internal mutex guards only the scan-and-reserve step; nothing
/// long-running (process spawn, port probing of an already-reserved port)
/// happens under it. Release is idempotent: releasing a task with no
/// leases is a no-op, and double release frees exactly the same set as a
/// single release.
pub struct ResourceRegistry<P, C>
where
    P: PortProbe,
    C: Clock + Send + Sync,
{
    probe: Arc<P>,
    clock: Arc<C>,
    state: Mutex<RegistryState>,
}

impl<P, C> ResourceRegistry<P, C>
where
    P: PortProbe,
    C: Clock + Send + Sync,
{
    /// Creates an empty registry over the given probe.
    #[must_use]
    pub fn new(probe: Arc<P>, clock: Arc<C>) -> Self {
        Self {
            probe,
            clock,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Leases a free port for `task_id`, preferring `range`.
    ///
    /// Scans the preferred range first and expands up to the configured
    /// ceiling. A port occupied by an external process is skipped, never
    /// reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Exhausted`] when no port in the range or
    /// its expansion window is free, without disturbing existing leases.
    pub fn allocate_port(
        &self,
        task_id: TaskId,
        range: PortRange,
        ttl: Option<Duration>,
    ) -> ResourceResult<ResourceLease> {
        let mut state = self.state.lock().map_err(|_| ResourceError::Poisoned)?;

        let chosen = range
            .candidates()
            .find(|port| !state.reserved_ports.contains(port) && self.probe.is_free(*port));

        let Some(port) = chosen else {
            warn!(%task_id, start = range.start, ceiling = range.ceiling, "port range exhausted");
            return Err(ResourceError::Exhausted {
                start: range.start,
                end: range.end,
                ceiling: range.ceiling,
            });
        };

        state.reserved_ports.insert(port);
        let lease = ResourceLease::new(LeasedResource::Port(port), task_id, ttl, &*self.clock);
        state.leases.entry(task_id).or_default().push(lease.clone());
        debug!(%task_id, port, "port leased");
        Ok(lease)
    }

    /// Leases a named exclusive lock for `task_id`.
    ///
    /// Re-acquiring a lock the task already holds returns the existing
    /// lease.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::LockHeld`] when another task holds the
    /// lock.
    pub fn acquire_lock(
        &self,
        task_id: TaskId,
        name: impl Into<String>,
        ttl: Option<Duration>,
    ) -> ResourceResult<ResourceLease> {
        let name = name.into();
        let mut state = self.state.lock().map_err(|_| ResourceError::Poisoned)?;

        if let Some(owner) = state.held_locks.get(&name).copied() {
            if owner != task_id {
                return Err(ResourceError::LockHeld { name, owner });
            }
            if let Some(existing) = state.leases.get(&task_id).and_then(|leases| {
                leases
                    .iter()
                    .find(|lease| lease.resource() == &LeasedResource::Lock(name.clone()))
            }) {
                return Ok(existing.clone());
            }
        }

        state.held_locks.insert(name.clone(), task_id);
        let lease = ResourceLease::new(LeasedResource::Lock(name), task_id, ttl, &*self.clock);
        state.leases.entry(task_id).or_default().push(lease.clone());
        Ok(lease)
    }

    /// Releases every lease owned by `task_id`.
    ///
    /// Idempotent and safe to call an arbitrary number of times; returns
    /// the leases that were actually freed by this call.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Poisoned`] when the registry mutex was
    /// poisoned.
    pub fn release(&self, task_id: TaskId) -> ResourceResult<Vec<ResourceLease>> {
        let mut state = self.state.lock().map_err(|_| ResourceError::Poisoned)?;

        let Some(leases) = state.leases.remove(&task_id) else {
            return Ok(Vec::new());
        };

        for lease in &leases {
            match lease.resource() {
                LeasedResource::Port(port) => {
                    state.reserved_ports.remove(port);
                }
                LeasedResource::Lock(name) => {
                    state.held_locks.remove(name);
                }
            }
        }
        debug!(%task_id, released = leases.len(), "leases released");
        Ok(leases)
    }

    /// Returns the leases currently held by `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Poisoned`] when the registry mutex was
    /// poisoned.
    pub fn leases(&self, task_id: TaskId) -> ResourceResult<Vec<ResourceLease>> {
        let state = self.state.lock().map_err(|_| ResourceError::Poisoned)?;
        Ok(state.leases.get(&task_id).cloned().unwrap_or_default())
    }

    /// Returns the set of currently reserved ports.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Poisoned`] when the registry mutex was
    /// poisoned.
    pub fn reserved_ports(&self) -> ResourceResult<HashSet<u16>> {
        let state = self.state.lock().map_err(|_| ResourceError::Poisoned)?;
        Ok(state.reserved_ports.clone())
    }
}

impl<P, C> SessionCleanup for ResourceRegistry<P, C>
where
    P: PortProbe,
    C: Clock + Send + Sync,
{
    fn release_task(&self, task_id: TaskId) {
        match self.release(task_id) {
            Ok(freed) if freed.is_empty() => {}
            Ok(freed) => debug!(%task_id, count = freed.len(), "leases released on session exit"),
            Err(err) => warn!(%task_id, error = %err, "lease release failed"),
        }
    }
}
