//! Charging Domain Ports
//!
//! The accounting core never talks to a database, a rater or a lock service
//! directly. It depends on the three collaborator traits below, implemented by
//! adapters such as the in-memory store of `infra_store`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_charging::{Responder, ChargingConfig};
//! use infra_store::{InMemoryStorage, FlatRateRater, NamedLocker};
//! use std::sync::Arc;
//!
//! let responder = Responder::new(
//!     Arc::new(InMemoryStorage::new()),
//!     Arc::new(FlatRateRater::default()),
//!     Arc::new(NamedLocker::new()),
//!     ChargingConfig::default(),
//! );
//! ```

use std::time::Duration;

use core_kernel::{AccountKey, DomainPort, PortError};

use crate::account::Account;
use crate::action::Action;
use crate::call::{CallCost, CallDescriptor};
use crate::error::ChargingError;
use crate::shared_group::SharedGroup;

/// Persistence collaborator for accounts, shared groups, destinations and
/// action sets
pub trait AccountingStorage: DomainPort {
    /// Loads an account, `PortError::NotFound` when it does not exist
    fn get_account(&self, id: &AccountKey) -> Result<Account, PortError>;

    /// Stores the whole account, replacing any previous version
    fn set_account(&self, account: &Account) -> Result<(), PortError>;

    /// Loads a shared group; `skip_cache` forces a read of the source of truth
    fn get_shared_group(&self, id: &str, skip_cache: bool) -> Result<SharedGroup, PortError>;

    fn set_shared_group(&self, group: &SharedGroup) -> Result<(), PortError>;

    /// Destination ids containing `prefix`, `PortError::NotFound` when none
    fn get_reverse_destination(&self, prefix: &str) -> Result<Vec<String>, PortError>;

    /// The action set registered under `id`
    fn get_actions(&self, id: &str) -> Result<Vec<Action>, PortError>;
}

/// Rating collaborator turning a call descriptor into priced time spans
///
/// Implementations return increments for every time span, set
/// `CallCost::connect_fee`, and include that fee in `CallCost::cost` when
/// `CallDescriptor::loop_index` is zero.
pub trait RatingPort: DomainPort {
    fn get_cost(&self, cd: &CallDescriptor) -> Result<CallCost, PortError>;
}

/// Mutual-exclusion collaborator
pub trait Guardian: DomainPort {
    /// Runs `critical` while holding every named resource
    ///
    /// Fails with [`ChargingError::LockTimeout`] when the resources cannot all
    /// be acquired within `timeout`; `critical` is not run in that case.
    fn guard(
        &self,
        resource_ids: &[String],
        timeout: Duration,
        critical: &mut dyn FnMut() -> Result<(), ChargingError>,
    ) -> Result<(), ChargingError>;
}

/// Typed convenience over [`Guardian::guard`]
pub fn guard<T>(
    guardian: &dyn Guardian,
    resource_ids: &[String],
    timeout: Duration,
    critical: impl FnOnce() -> Result<T, ChargingError>,
) -> Result<T, ChargingError> {
    let mut critical = Some(critical);
    let mut output = None;
    guardian.guard(resource_ids, timeout, &mut || {
        if let Some(run) = critical.take() {
            output = Some(run()?);
        }
        Ok(())
    })?;
    output.ok_or_else(|| ChargingError::invalid_input("guarded section did not run"))
}
