//! Actions - administrative mutations run against one account
//!
//! Actions are grouped in weight-ordered action sets fetched through the
//! storage port, run either by fired triggers or by the responder's
//! `execute_actions` entry point. Each tag maps to a handler in the
//! [`ActionRegistry`](crate::registry::ActionRegistry).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::parse_expiration;

use crate::account::Account;
use crate::balance_filter::BalanceFilter;
use crate::context::ChargingContext;
use crate::error::ChargingError;

pub const TOPUP: &str = "*topup";
pub const TOPUP_RESET: &str = "*topup_reset";
pub const DEBIT: &str = "*debit";
pub const DEBIT_RESET: &str = "*debit_reset";
pub const SET_BALANCE: &str = "*set_balance";
pub const REMOVE_BALANCE: &str = "*remove_balance";
pub const ENABLE_BALANCE: &str = "*enable_balance";
pub const DISABLE_BALANCE: &str = "*disable_balance";
pub const RESET_TRIGGERS: &str = "*reset_triggers";
pub const SET_RECURRENT: &str = "*set_recurrent";
pub const UNSET_RECURRENT: &str = "*unset_recurrent";
pub const ALLOW_NEGATIVE: &str = "*allow_negative";
pub const DENY_NEGATIVE: &str = "*deny_negative";
pub const ENABLE_ACCOUNT: &str = "*enable_account";
pub const DISABLE_ACCOUNT: &str = "*disable_account";
pub const RESET_COUNTERS: &str = "*reset_counters";
pub const RESET_ACCOUNT: &str = "*reset_account";
pub const LOG: &str = "*log";

/// Handler run for one action tag
///
/// Receives the account, the action, the whole action set it belongs to and
/// the collaborators of the current operation.
pub type ActionHandler =
    fn(&mut Account, &Action, &[Action], &ChargingContext<'_>) -> Result<(), ChargingError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Action {
    #[serde(rename = "Id")]
    pub id: String,
    pub action_type: String,
    /// JSON object with handler-specific parameters
    pub extra_parameters: String,
    /// Reserved condition on the account, not evaluated
    pub filter: String,
    /// Relative (`+30d`) or absolute expiry stamped on created balances
    pub expiration_string: String,
    pub weight: f64,
    pub balance: BalanceFilter,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            ..Default::default()
        }
    }

    pub fn with_balance(mut self, balance: BalanceFilter) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_extra_parameters(mut self, extra: impl Into<String>) -> Self {
        self.extra_parameters = extra.into();
        self
    }

    pub fn balance_type(&self) -> &str {
        self.balance.balance_type()
    }

    /// Extra parameters parsed as a JSON object, `None` when absent or invalid
    pub fn extra_json(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        if self.extra_parameters.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&self.extra_parameters) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// This action with its expiration string applied to the balance filter
    ///
    /// An expiry already set on the filter wins over the expiration string.
    pub fn resolve_expiration(&self, now: DateTime<Utc>) -> Result<Action, ChargingError> {
        let mut action = self.clone();
        if action.balance.expiration_date.is_none() && !action.expiration_string.is_empty() {
            action.balance.expiration_date = parse_expiration(&action.expiration_string, now)?;
        }
        Ok(action)
    }

    /// Copy with the balance value sign flipped, turning a debit into a topup
    fn negated(&self) -> Action {
        let mut action = self.clone();
        action.balance.value = action.balance.value.map(|v| -v);
        action
    }
}

/// Sorts an action set by weight, heaviest first
pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}

pub(crate) fn topup(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    ctx: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.debit_balance_action(&action.negated(), false, ctx)
}

pub(crate) fn topup_reset(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    ctx: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.debit_balance_action(&action.negated(), true, ctx)
}

pub(crate) fn debit(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    ctx: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.debit_balance_action(action, false, ctx)
}

pub(crate) fn debit_reset(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    ctx: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.debit_balance_action(action, true, ctx)
}

pub(crate) fn set_balance(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    ctx: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.set_balance_action(action, ctx)
}

pub(crate) fn remove_balance(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.remove_balance_action(action)
}

pub(crate) fn enable_balance(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    let mut action = action.clone();
    action.balance.disabled = Some(false);
    account.enable_disable_balance(&action)
}

pub(crate) fn disable_balance(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    let mut action = action.clone();
    action.balance.disabled = Some(true);
    account.enable_disable_balance(&action)
}

pub(crate) fn reset_triggers(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    ctx: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.reset_action_triggers(Some(action));
    account.execute_action_triggers(Some(action), ctx);
    Ok(())
}

pub(crate) fn set_recurrent(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.set_recurrent(Some(action), true);
    Ok(())
}

pub(crate) fn unset_recurrent(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.set_recurrent(Some(action), false);
    Ok(())
}

pub(crate) fn allow_negative(
    account: &mut Account,
    _: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.allow_negative = true;
    Ok(())
}

pub(crate) fn deny_negative(
    account: &mut Account,
    _: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.allow_negative = false;
    Ok(())
}

pub(crate) fn enable_account(
    account: &mut Account,
    _: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.disabled = false;
    Ok(())
}

pub(crate) fn disable_account(
    account: &mut Account,
    _: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.disabled = true;
    Ok(())
}

pub(crate) fn reset_counters(
    account: &mut Account,
    action: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.unit_counters.reset_counters(Some(action));
    Ok(())
}

pub(crate) fn reset_account(
    account: &mut Account,
    _: &Action,
    _: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    account.reset();
    Ok(())
}

pub(crate) fn log(
    account: &mut Account,
    action: &Action,
    batch: &[Action],
    _: &ChargingContext<'_>,
) -> Result<(), ChargingError> {
    let balances = serde_json::to_string(&account.balance_map).unwrap_or_default();
    info!(
        account = %account.id,
        action_id = %action.id,
        batch_size = batch.len(),
        balances = %balances,
        "log action"
    );
    Ok(())
}
