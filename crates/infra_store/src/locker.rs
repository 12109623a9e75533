//! Named-resource guardian
//!
//! Resources are plain strings (account ids, `*shared_group:`-prefixed group
//! ids). A caller acquires all of its names at once or none of them, which
//! keeps overlapping multi-account operations free of lock-order deadlocks.

use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use core_kernel::DomainPort;
use domain_charging::{ChargingError, Guardian};

#[derive(Debug, Default)]
pub struct NamedLocker {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its names when dropped, also when the critical section panics
struct HeldNames<'a> {
    locker: &'a NamedLocker,
    names: BTreeSet<String>,
}

impl Drop for HeldNames<'_> {
    fn drop(&mut self) {
        let mut held = self.locker.held.lock();
        for name in &self.names {
            held.remove(name);
        }
        drop(held);
        self.locker.released.notify_all();
    }
}

impl NamedLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held by some caller
    pub fn is_held(&self, name: &str) -> bool {
        self.held.lock().contains(name)
    }

    fn acquire(&self, names: BTreeSet<String>, timeout: Duration) -> Result<HeldNames<'_>, ChargingError> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock();
        while names.iter().any(|name| held.contains(name)) {
            if self.released.wait_until(&mut held, deadline).timed_out()
                && names.iter().any(|name| held.contains(name))
            {
                let resources = names.iter().cloned().collect::<Vec<_>>().join(",");
                warn!(resources = %resources, "lock timeout");
                return Err(ChargingError::LockTimeout {
                    resources,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        held.extend(names.iter().cloned());
        Ok(HeldNames { locker: self, names })
    }
}

impl DomainPort for NamedLocker {}

impl Guardian for NamedLocker {
    fn guard(
        &self,
        resource_ids: &[String],
        timeout: Duration,
        critical: &mut dyn FnMut() -> Result<(), ChargingError>,
    ) -> Result<(), ChargingError> {
        let names: BTreeSet<String> = resource_ids.iter().cloned().collect();
        let _held = self.acquire(names, timeout)?;
        debug!(resources = resource_ids.len(), "locks acquired");
        critical()
    }
}
