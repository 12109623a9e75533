//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Duration, Utc};
use core_kernel::AccountKey;
use domain_charging::constants::{MONETARY, VOICE};
use domain_charging::{
    Account, ActionTrigger, Balance, BalanceFilter, CallDescriptor, StringMap, ThresholdType,
};
use rust_decimal::Decimal;

use crate::fixtures::{TemporalFixtures, TENANT};

/// Builder for constructing test balances
pub struct TestBalanceBuilder {
    balance: Balance,
}

impl TestBalanceBuilder {
    /// Creates a clean balance holding `value`
    pub fn new(id: impl Into<String>, value: Decimal) -> Self {
        Self {
            balance: Balance::new(id, value),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.balance.weight = weight;
        self
    }

    /// Destination rules such as `"NAT;!RET"`
    pub fn with_destinations(mut self, rules: &str) -> Self {
        self.balance.destination_ids = StringMap::parse(rules);
        self
    }

    pub fn with_categories(mut self, rules: &str) -> Self {
        self.balance.categories = StringMap::parse(rules);
        self
    }

    pub fn with_directions(mut self, rules: &str) -> Self {
        self.balance.directions = StringMap::parse(rules);
        self
    }

    pub fn with_shared_group(mut self, group: &str) -> Self {
        self.balance.shared_groups.insert(group, true);
        self
    }

    pub fn with_rating_subject(mut self, subject: impl Into<String>) -> Self {
        self.balance.rating_subject = subject.into();
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.balance.expiration_date = Some(at);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.balance.disabled = true;
        self
    }

    pub fn blocker(mut self) -> Self {
        self.balance.blocker = true;
        self
    }

    pub fn build(self) -> Balance {
        self.balance
    }
}

/// Builder for constructing test accounts
pub struct TestAccountBuilder {
    account: Account,
}

impl TestAccountBuilder {
    /// Creates an empty account of the test tenant
    pub fn new(name: &str) -> Self {
        Self {
            account: Account::new(AccountKey::new(TENANT, name)),
        }
    }

    pub fn with_balance(mut self, balance_type: &str, balance: Balance) -> Self {
        self.account.add_balance(balance_type, balance);
        self
    }

    /// Adds a plain money balance
    pub fn with_money(self, id: &str, value: Decimal) -> Self {
        self.with_balance(MONETARY, Balance::new(id, value))
    }

    /// Adds a plain voice balance holding `seconds`
    pub fn with_voice_seconds(self, id: &str, seconds: i64) -> Self {
        self.with_balance(VOICE, Balance::new(id, Decimal::from(seconds)))
    }

    pub fn with_trigger(mut self, trigger: ActionTrigger) -> Self {
        self.account.action_triggers.push(trigger);
        self
    }

    pub fn allow_negative(mut self) -> Self {
        self.account.allow_negative = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.account.disabled = true;
        self
    }

    /// Builds the account with counters derived from its triggers
    pub fn build(mut self) -> Account {
        self.account.init_counters();
        self.account
    }
}

/// Builder for constructing test action triggers
pub struct TestTriggerBuilder {
    trigger: ActionTrigger,
}

impl TestTriggerBuilder {
    pub fn new(
        unique_id: &str,
        threshold_type: ThresholdType,
        threshold_value: Decimal,
        actions_id: &str,
    ) -> Self {
        Self {
            trigger: ActionTrigger::new(unique_id, threshold_type, threshold_value, actions_id),
        }
    }

    /// Watches balances of one type
    pub fn on_type(mut self, balance_type: &str) -> Self {
        self.trigger.balance = BalanceFilter::of_type(balance_type);
        self
    }

    pub fn on_balance(mut self, filter: BalanceFilter) -> Self {
        self.trigger.balance = filter;
        self
    }

    pub fn recurrent(mut self) -> Self {
        self.trigger.recurrent = true;
        self
    }

    pub fn with_min_sleep(mut self, min_sleep: Duration) -> Self {
        self.trigger.min_sleep = min_sleep;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.trigger.weight = weight;
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.trigger.expiration_date = Some(at);
        self
    }

    pub fn build(self) -> ActionTrigger {
        self.trigger
    }
}

/// Builder for constructing test call descriptors
pub struct TestCallBuilder {
    cd: CallDescriptor,
}

impl TestCallBuilder {
    /// A one minute voice call from `account` to `destination`
    pub fn new(account: &str, destination: &str) -> Self {
        let start = TemporalFixtures::call_start();
        Self {
            cd: CallDescriptor::new(TENANT, account, destination, start, start + Duration::minutes(1)),
        }
    }

    pub fn lasting(mut self, seconds: i64) -> Self {
        self.cd.time_end = self.cd.time_start + Duration::seconds(seconds);
        self.cd.duration_index = self.cd.duration();
        self
    }

    pub fn with_tor(mut self, tor: &str) -> Self {
        self.cd.tor = tor.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.cd.category = category.to_string();
        self
    }

    pub fn with_loop_index(mut self, loop_index: u32) -> Self {
        self.cd.loop_index = loop_index;
        self
    }

    pub fn build(self) -> CallDescriptor {
        self.cd
    }
}
