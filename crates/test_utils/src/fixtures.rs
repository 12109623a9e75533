//! Pre-built Test Fixtures
//!
//! Provides fixed instants and a ready-to-use in-memory charging world so
//! tests only describe accounts, groups and rates relevant to them.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::AccountKey;
use domain_charging::{
    Account, Action, ActionRegistry, AccountingStorage, ChargingConfig, ChargingContext, Responder,
    SharedGroup,
};
use infra_store::{FlatRateRater, InMemoryStorage, NamedLocker, RatePlan};

/// Tenant of every test account
pub const TENANT: &str = "cgrates.org";

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

/// Routes engine logs to the test harness, honouring `RUST_LOG`
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Start of every test call (Jan 1, 2024 12:00 UTC)
    pub fn call_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    /// An instant long gone, for expired balances and triggers
    pub fn long_ago() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    /// An instant far ahead, for balances that outlive every test
    pub fn far_future() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()
    }
}

/// Fixture for rates
pub struct RateFixtures;

impl RateFixtures {
    /// 0.60 per minute billed per second, for every destination and subject
    pub fn standard() -> RatePlan {
        RatePlan::per_minute("", dec!(0.6), 1)
    }
}

/// An in-memory charging system
///
/// Storage, rater and locker are shared with the responder, so accounts
/// seeded here are what the responder charges.
pub struct ChargingWorld {
    pub storage: Arc<InMemoryStorage>,
    pub rater: Arc<FlatRateRater>,
    pub locker: Arc<NamedLocker>,
    pub actions: ActionRegistry,
    pub config: ChargingConfig,
    pub responder: Responder,
}

impl Default for ChargingWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ChargingWorld {
    /// A world rating every call with [`RateFixtures::standard`]
    pub fn new() -> Self {
        Self::with_plans([RateFixtures::standard()])
    }

    pub fn with_plans(plans: impl IntoIterator<Item = RatePlan>) -> Self {
        init_test_tracing();
        let storage = Arc::new(InMemoryStorage::new());
        let rater = Arc::new(FlatRateRater::from_plans(plans));
        let locker = Arc::new(NamedLocker::new());
        let config = ChargingConfig::default();
        let responder = Responder::new(storage.clone(), rater.clone(), locker.clone(), config.clone());
        Self {
            storage,
            rater,
            locker,
            actions: ActionRegistry::with_defaults(),
            config,
            responder,
        }
    }

    /// Collaborators for calling account operations directly
    pub fn context(&self) -> ChargingContext<'_> {
        ChargingContext::new(
            self.storage.as_ref(),
            self.rater.as_ref(),
            self.locker.as_ref(),
            &self.actions,
            &self.config,
        )
    }

    pub fn add_account(&self, account: Account) -> AccountKey {
        let id = account.id.clone();
        self.storage.set_account(&account).unwrap();
        id
    }

    pub fn add_shared_group(&self, group: SharedGroup) {
        self.storage.set_shared_group(&group).unwrap();
    }

    pub fn add_destination(&self, id: &str, prefixes: &[&str]) {
        self.storage
            .set_destination(id, prefixes.iter().map(|p| p.to_string()).collect());
    }

    pub fn add_actions(&self, id: &str, actions: Vec<Action>) {
        self.storage.set_actions(id, actions);
    }

    /// Current stored state of a test account
    pub fn account(&self, name: &str) -> Account {
        self.storage.get_account(&AccountKey::new(TENANT, name)).unwrap()
    }
}
