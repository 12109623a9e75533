//! Rated requests and their paid breakdown
//!
//! A [`CallDescriptor`] describes the usage to charge. The rating
//! collaborator prices it into a [`CallCost`]: ordered [`TimeSpan`]s, each an
//! ordered list of priced [`Increment`]s. The debit engine records on every
//! increment which balances paid for it.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::temporal::duration_nanos;
use core_kernel::{AccountKey, BalanceUuid};

use crate::constants::VOICE;
use crate::error::ChargingError;

/// A request for charging a window of usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallDescriptor {
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub category: String,
    pub tenant: String,
    #[serde(default)]
    pub subject: String,
    pub account: String,
    pub destination: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Position of this segment in a sequence of requests for one session;
    /// only the first segment pays the connect fee
    #[serde(default)]
    pub loop_index: u32,
    /// Session usage so far, including this window
    #[serde(with = "duration_nanos", default = "Duration::zero")]
    pub duration_index: Duration,
    /// Unit balance type paying for the usage
    #[serde(rename = "TOR", default)]
    pub tor: String,
    #[serde(with = "rust_decimal::serde::float", default)]
    pub max_cost_so_far: Decimal,
    /// Previously paid increments, used when refunding
    #[serde(default)]
    pub increments: Vec<Increment>,
}

impl CallDescriptor {
    /// A voice request for `account` of `tenant` between two instants
    pub fn new(
        tenant: impl Into<String>,
        account: impl Into<String>,
        destination: impl Into<String>,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        let account = account.into();
        Self {
            direction: "*out".to_string(),
            category: "call".to_string(),
            tenant: tenant.into(),
            subject: account.clone(),
            account,
            destination: destination.into(),
            time_start,
            time_end,
            loop_index: 0,
            duration_index: time_end - time_start,
            tor: VOICE.to_string(),
            max_cost_so_far: Decimal::ZERO,
            increments: Vec::new(),
        }
    }

    pub fn account_key(&self) -> AccountKey {
        AccountKey::new(&self.tenant, &self.account)
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// Rejects windows that are empty, inverted or longer than `max_duration`
    pub fn validate(&self, max_duration: Duration) -> Result<(), ChargingError> {
        if self.tenant.is_empty() || self.account.is_empty() {
            return Err(ChargingError::invalid_input("call descriptor without tenant or account"));
        }
        if self.time_end <= self.time_start {
            return Err(ChargingError::invalid_input("time start must be strictly before time end"));
        }
        if self.duration() > max_duration {
            return Err(ChargingError::invalid_input(format!(
                "usage of {}s exceeds the maximum of {}s",
                self.duration().num_seconds(),
                max_duration.num_seconds()
            )));
        }
        Ok(())
    }

    /// Defaults the unit type and widens the duration index to the window
    pub fn normalize(&mut self) {
        if self.tor.is_empty() {
            self.tor = VOICE.to_string();
        }
        if self.duration_index < self.duration() {
            self.duration_index = self.duration();
        }
    }

    /// A copy rated under another subject, as balances with their own
    /// rating subject require
    pub fn with_rating_subject(&self, subject: &str) -> Self {
        let mut cd = self.clone();
        cd.subject = subject.to_string();
        cd.account = subject.to_string();
        cd
    }

    /// An empty result carrying this request's identity
    pub fn create_call_cost(&self) -> CallCost {
        CallCost {
            direction: self.direction.clone(),
            category: self.category.clone(),
            tenant: self.tenant.clone(),
            subject: self.subject.clone(),
            account: self.account.clone(),
            destination: self.destination.clone(),
            tor: self.tor.clone(),
            cost: Decimal::ZERO,
            connect_fee: Decimal::ZERO,
            timespans: Vec::new(),
            deduct_connect_fee: self.loop_index == 0,
            negative_connect_fee: false,
            max_cost_disconnect: false,
        }
    }
}

/// The priced and, after a debit, paid breakdown of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallCost {
    pub direction: String,
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    #[serde(rename = "TOR")]
    pub tor: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    #[serde(with = "rust_decimal::serde::float", default)]
    pub connect_fee: Decimal,
    pub timespans: Vec<TimeSpan>,
    #[serde(skip)]
    pub deduct_connect_fee: bool,
    /// The connect fee was taken from the default balance into debt
    #[serde(skip)]
    pub negative_connect_fee: bool,
    /// A max-cost `*disconnect` rule cut the breakdown short
    #[serde(skip)]
    pub max_cost_disconnect: bool,
}

impl CallCost {
    /// Sum of increment costs over all time spans, connect fee excluded
    pub fn timespans_cost(&self) -> Decimal {
        self.timespans.iter().map(TimeSpan::cost).sum()
    }

    pub fn increments(&self) -> impl Iterator<Item = &Increment> {
        self.timespans.iter().flat_map(|ts| ts.increments.iter())
    }

    /// Total usage covered by the time spans
    pub fn duration(&self) -> Duration {
        self.timespans.iter().fold(Duration::zero(), |acc, ts| acc + ts.duration())
    }
}

/// What happens to increments once a session reached its cost cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxCostStrategy {
    /// Stop the session
    #[serde(rename = "*disconnect")]
    Disconnect,
    /// Keep going at zero cost
    #[serde(rename = "*free")]
    Free,
}

/// A session cost cap applied to the increments of a time span
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MaxCost {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub strategy: MaxCostStrategy,
}

/// A contiguous window rated under one rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    #[serde(with = "duration_nanos", default = "Duration::zero")]
    pub duration_index: Duration,
    pub increments: Vec<Increment>,
    #[serde(default)]
    pub max_cost: Option<MaxCost>,
}

impl TimeSpan {
    pub fn new(time_start: DateTime<Utc>, time_end: DateTime<Utc>) -> Self {
        Self {
            time_start,
            time_end,
            duration_index: Duration::zero(),
            increments: Vec::new(),
            max_cost: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    pub fn cost(&self) -> Decimal {
        self.increments.iter().map(|inc| inc.cost).sum()
    }

    /// Splits the window into equal zero-cost increments of `increment`,
    /// first extending it to a whole number of increments
    pub fn fill_zero_cost_increments(&mut self, increment: Duration) {
        let duration = core_kernel::round_up_to_increment(self.duration(), increment);
        self.time_end = self.time_start + duration;
        let count = match (duration.num_nanoseconds(), increment.num_nanoseconds()) {
            (Some(d), Some(i)) if i > 0 => d / i,
            _ => 0,
        };
        self.increments = (0..count).map(|_| Increment::new(increment, Decimal::ZERO)).collect();
    }

    /// Drops the increment at `index` and every later one, shrinking the window
    pub fn truncate_at(&mut self, index: usize) {
        self.increments.truncate(index);
        let covered = self
            .increments
            .iter()
            .fold(Duration::zero(), |acc, inc| acc + inc.duration);
        let dropped = self.duration() - covered;
        self.time_end = self.time_start + covered;
        self.duration_index = self.duration_index - dropped;
    }
}

/// The smallest priced slice of usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Increment {
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    #[serde(default)]
    pub balance_info: DebitInfo,
    #[serde(skip)]
    pub(crate) paid: bool,
}

impl Increment {
    pub fn new(duration: Duration, cost: Decimal) -> Self {
        Self {
            duration,
            cost,
            balance_info: DebitInfo::default(),
            paid: false,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.paid
    }

    /// Usage of this increment in units (seconds)
    pub fn units(&self) -> Decimal {
        let nanos = self.duration.num_nanoseconds().unwrap_or(i64::MAX);
        Decimal::from_i128_with_scale(nanos as i128, 9)
    }
}

/// Which balances paid for an increment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebitInfo {
    pub unit: Option<UnitInfo>,
    pub monetary: Option<MonetaryInfo>,
    /// Owner of the paying balances, which may be a shared-group peer
    #[serde(rename = "AccountID")]
    pub account_id: Option<AccountKey>,
}

/// A unit balance debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitInfo {
    #[serde(rename = "UUID")]
    pub uuid: BalanceUuid,
    #[serde(rename = "ID")]
    pub id: String,
    /// Balance value after the debit
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    #[serde(rename = "DestinationID")]
    pub destination_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub consumed: Decimal,
    #[serde(rename = "TOR")]
    pub tor: String,
}

/// A money balance debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonetaryInfo {
    #[serde(rename = "UUID")]
    pub uuid: BalanceUuid,
    #[serde(rename = "ID")]
    pub id: String,
    /// Balance value after the debit
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}
