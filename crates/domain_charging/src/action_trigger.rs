//! Threshold rules over balances and unit counters
//!
//! A trigger is armed until an evaluation pass finds its watched metric
//! across the threshold; it then runs its action set and stays fired until
//! reset. Recurrent triggers re-arm right after firing and are throttled by
//! their minimum sleep instead.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::temporal::duration_nanos;

use crate::action::Action;
use crate::balance::Balance;
use crate::balance_filter::BalanceFilter;
use crate::error::ChargingError;
use crate::unit_counter::CounterType;

/// Metric watched by a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMetric {
    Balance,
    Counter(CounterType),
    Expiry,
}

/// Direction in which a threshold is crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Fires when the metric is at or above the threshold
    Max,
    /// Fires when the metric is at or below the threshold
    Min,
}

/// Encodes metric and comparator of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ThresholdType {
    MinBalance,
    MaxBalance,
    BalanceExpired,
    MinEventCounter,
    MaxEventCounter,
    MinBalanceCounter,
    MaxBalanceCounter,
}

impl ThresholdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdType::MinBalance => "*min_balance",
            ThresholdType::MaxBalance => "*max_balance",
            ThresholdType::BalanceExpired => "*balance_expired",
            ThresholdType::MinEventCounter => "*min_event_counter",
            ThresholdType::MaxEventCounter => "*max_event_counter",
            ThresholdType::MinBalanceCounter => "*min_balance_counter",
            ThresholdType::MaxBalanceCounter => "*max_balance_counter",
        }
    }

    pub fn metric(&self) -> ThresholdMetric {
        match self {
            ThresholdType::MinBalance | ThresholdType::MaxBalance => ThresholdMetric::Balance,
            ThresholdType::BalanceExpired => ThresholdMetric::Expiry,
            ThresholdType::MinEventCounter | ThresholdType::MaxEventCounter => {
                ThresholdMetric::Counter(CounterType::Event)
            }
            ThresholdType::MinBalanceCounter | ThresholdType::MaxBalanceCounter => {
                ThresholdMetric::Counter(CounterType::Balance)
            }
        }
    }

    pub fn comparator(&self) -> Comparator {
        match self {
            ThresholdType::MaxBalance
            | ThresholdType::MaxEventCounter
            | ThresholdType::MaxBalanceCounter => Comparator::Max,
            _ => Comparator::Min,
        }
    }

    /// The counter this trigger reads, for counter triggers
    pub fn counter_type(&self) -> Option<CounterType> {
        match self.metric() {
            ThresholdMetric::Counter(counter_type) => Some(counter_type),
            _ => None,
        }
    }

    pub fn crossed(&self, value: Decimal, threshold: Decimal) -> bool {
        match self.comparator() {
            Comparator::Max => value >= threshold,
            Comparator::Min => value <= threshold,
        }
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdType {
    type Err = ChargingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*min_balance" => Ok(ThresholdType::MinBalance),
            "*max_balance" => Ok(ThresholdType::MaxBalance),
            "*balance_expired" => Ok(ThresholdType::BalanceExpired),
            "*min_event_counter" => Ok(ThresholdType::MinEventCounter),
            "*max_event_counter" => Ok(ThresholdType::MaxEventCounter),
            "*min_balance_counter" => Ok(ThresholdType::MinBalanceCounter),
            "*max_balance_counter" => Ok(ThresholdType::MaxBalanceCounter),
            other => Err(ChargingError::invalid_input(format!("unknown threshold type {}", other))),
        }
    }
}

impl TryFrom<String> for ThresholdType {
    type Error = ChargingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ThresholdType> for String {
    fn from(t: ThresholdType) -> String {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionTrigger {
    /// Group id shared by triggers provisioned together
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "UniqueID", default)]
    pub unique_id: String,
    pub threshold_type: ThresholdType,
    #[serde(with = "rust_decimal::serde::float")]
    pub threshold_value: Decimal,
    #[serde(default)]
    pub recurrent: bool,
    /// Minimum interval between two firings of a recurrent trigger
    #[serde(with = "duration_nanos", default = "Duration::zero")]
    pub min_sleep: Duration,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub activation_date: Option<DateTime<Utc>>,
    /// Balances or counters this trigger watches
    #[serde(default)]
    pub balance: BalanceFilter,
    #[serde(default)]
    pub weight: f64,
    #[serde(rename = "ActionsID")]
    pub actions_id: String,
    #[serde(default)]
    pub executed: bool,
    #[serde(default)]
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl ActionTrigger {
    pub fn new(
        unique_id: impl Into<String>,
        threshold_type: ThresholdType,
        threshold_value: Decimal,
        actions_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            unique_id: unique_id.into(),
            threshold_type,
            threshold_value,
            recurrent: false,
            min_sleep: Duration::zero(),
            expiration_date: None,
            activation_date: None,
            balance: BalanceFilter::default(),
            weight: 0.0,
            actions_id: actions_id.into(),
            executed: false,
            last_execution_time: None,
        }
    }

    pub fn balance_type(&self) -> &str {
        self.balance.balance_type()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.activation_date.map_or(true, |at| at <= now)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map_or(false, |exp| exp <= now)
    }

    /// A recurrent trigger fired less than `min_sleep` ago
    pub fn is_throttled(&self, now: DateTime<Utc>) -> bool {
        self.recurrent
            && self
                .last_execution_time
                .map_or(false, |last| now - last < self.min_sleep)
    }

    /// The filter of the counter this trigger reads
    ///
    /// Counters are keyed by the trigger's balance filter with its id
    /// defaulting to the trigger's unique id.
    pub fn counter_filter(&self) -> BalanceFilter {
        let mut filter = self.balance.clone();
        if filter.id.as_deref().map_or(true, str::is_empty) && !self.unique_id.is_empty() {
            filter.id = Some(self.unique_id.clone());
        }
        filter
    }

    /// Whether `balance` is watched by this trigger
    pub fn watches(&self, balance: &Balance) -> bool {
        balance.hard_match_filter(&self.balance, false)
    }

    /// Whether an action addresses this trigger
    ///
    /// No action, or one without filter and balance description, addresses
    /// every trigger. Otherwise the action's balance type and the
    /// `GroupID`, `UniqueID`, `ThresholdType` and `ThresholdValue` entries of
    /// its extra parameters must agree with the trigger.
    pub fn matches_action(&self, action: Option<&Action>) -> bool {
        let Some(action) = action else {
            return true;
        };
        if action.filter.is_empty() && action.balance == BalanceFilter::default() && action.extra_parameters.is_empty() {
            return true;
        }
        let type_ok = action
            .balance
            .balance_type
            .as_deref()
            .map_or(true, |t| t.is_empty() || t == self.balance_type());
        let Some(extra) = action.extra_json() else {
            return type_ok;
        };
        let text = |key: &str| extra.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty());
        let group_ok = text("GroupID").map_or(true, |g| g == self.id);
        let unique_ok = text("UniqueID").map_or(true, |u| u == self.unique_id);
        let threshold_type_ok = text("ThresholdType").map_or(true, |t| t == self.threshold_type.as_str());
        let threshold_value_ok = extra
            .get("ThresholdValue")
            .and_then(|v| v.as_f64())
            .filter(|v| *v != 0.0)
            .map_or(true, |v| Decimal::try_from(v).map_or(false, |v| v == self.threshold_value));
        type_ok && group_ok && unique_ok && threshold_type_ok && threshold_value_ok
    }
}

/// Sorts triggers by weight, heaviest first
pub fn sort_triggers(triggers: &mut [ActionTrigger]) {
    triggers.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}
