//! Account aggregate
//!
//! An account owns typed balance chains, the action triggers watching them
//! and the unit counters feeding counter triggers. Every operation here
//! assumes the caller holds the account's guardian lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, instrument, warn};

use core_kernel::{AccountKey, BalanceUuid};

use crate::action::{sort_actions, Action};
use crate::action_trigger::{sort_triggers, ActionTrigger, ThresholdMetric};
use crate::balance::{total_value, Balance};
use crate::call::{CallDescriptor, Increment};
use crate::constants::{GENERIC, META_DEFAULT, MONETARY};
use crate::context::ChargingContext;
use crate::error::ChargingError;
use crate::ports::guard;
use crate::selector::{select_balances, BalanceQuery};
use crate::shared_group::shared_group_lock_id;
use crate::unit_counter::{CounterEvent, CounterFilter, UnitCounter, UnitCounters};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    #[serde(rename = "ID")]
    pub id: AccountKey,
    /// Balance chains keyed by balance type
    #[serde(default)]
    pub balance_map: BTreeMap<String, Vec<Balance>>,
    #[serde(default)]
    pub unit_counters: UnitCounters,
    #[serde(default)]
    pub action_triggers: Vec<ActionTrigger>,
    /// Debt on the default balance is expected rather than a policy violation
    #[serde(default)]
    pub allow_negative: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(skip)]
    executing_triggers: bool,
}

impl Account {
    pub fn new(id: AccountKey) -> Self {
        Self {
            id,
            balance_map: BTreeMap::new(),
            unit_counters: UnitCounters::new(),
            action_triggers: Vec::new(),
            allow_negative: false,
            disabled: false,
            executing_triggers: false,
        }
    }

    pub fn add_balance(&mut self, balance_type: &str, balance: Balance) {
        self.balance_map.entry(balance_type.to_string()).or_default().push(balance);
    }

    pub fn balances(&self, balance_type: &str) -> &[Balance] {
        self.balance_map.get(balance_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of every balance of a type, expired ones included
    pub fn total_value(&self, balance_type: &str) -> Decimal {
        total_value(self.balances(balance_type))
    }

    pub fn has_balance(&self, uuid: BalanceUuid) -> bool {
        self.balance_by_uuid(uuid).is_some()
    }

    pub fn balance_by_uuid(&self, uuid: BalanceUuid) -> Option<&Balance> {
        self.balance_map.values().flatten().find(|b| b.uuid == uuid)
    }

    /// The `*default` money balance, created when missing
    pub fn get_default_money_balance(&mut self) -> &mut Balance {
        let balances = self.balance_map.entry(MONETARY.to_string()).or_default();
        let index = match balances.iter().position(Balance::is_default) {
            Some(index) => index,
            None => {
                let mut balance = Balance::new_default();
                balance.mark_dirty();
                balances.push(balance);
                balances.len() - 1
            }
        };
        &mut balances[index]
    }

    /// Ids of every shared group named by any balance
    pub fn shared_groups(&self) -> BTreeSet<String> {
        self.balance_map
            .values()
            .flatten()
            .flat_map(|b| b.shared_groups.included_keys())
            .map(str::to_string)
            .collect()
    }

    /// This account and every member of the shared groups its eligible
    /// balances for `cd` belong to
    ///
    /// These are the accounts a debit for `cd` may mutate, so all of them are
    /// locked together. Missing groups are skipped like during selection.
    pub fn unique_shared_group_members(
        &self,
        cd: &CallDescriptor,
        ctx: &ChargingContext<'_>,
    ) -> Result<BTreeSet<AccountKey>, ChargingError> {
        let now = Utc::now();
        let min_prefix = ctx.config.min_prefix_match;
        let mut groups = BTreeSet::new();
        for balance_type in [MONETARY, cd.tor.as_str()] {
            let query = BalanceQuery::new(&cd.destination, &cd.category, &cd.direction, balance_type);
            for candidate in select_balances(self, &query, ctx.storage, min_prefix, now)? {
                if let Some(balance) = self.balance_by_uuid(candidate.handle.uuid) {
                    groups.extend(balance.shared_groups.included_keys().map(str::to_string));
                }
            }
        }

        let mut members = BTreeSet::from([self.id.clone()]);
        for group_id in groups {
            match ctx.storage.get_shared_group(&group_id, false) {
                Ok(group) => members.extend(group.member_ids),
                Err(e) if e.is_not_found() => warn!(shared_group = %group_id, "could not get shared group"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(members)
    }

    /// Rebuilds unit counters from the counter triggers, keeping the values
    /// of counters whose filter survives
    pub fn init_counters(&mut self) {
        let previous = self.unit_counters.take();
        let mut rebuilt: BTreeMap<String, Vec<UnitCounter>> = BTreeMap::new();
        for trigger in &self.action_triggers {
            let Some(counter_type) = trigger.threshold_type.counter_type() else {
                continue;
            };
            let counters = rebuilt.entry(trigger.balance_type().to_string()).or_default();
            let index = match counters.iter().position(|uc| uc.counter_type == counter_type) {
                Some(index) => index,
                None => {
                    counters.push(UnitCounter::new(counter_type));
                    counters.len() - 1
                }
            };
            let filter = trigger.counter_filter();
            if !counters[index].has_counter(&filter) {
                counters[index].counters.push(CounterFilter {
                    value: Decimal::ZERO,
                    filter,
                });
            }
        }
        for (balance_type, counters) in &mut rebuilt {
            let Some(old) = previous.get(balance_type) else {
                continue;
            };
            for counter in counters.iter_mut() {
                for old_counter in old {
                    if counter.copy_counter_values(old_counter) {
                        break;
                    }
                }
            }
        }
        self.unit_counters.replace(rebuilt);
    }

    /// Rebuilds the counters when a counter trigger has none, as for
    /// accounts loaded from storage with triggers but no counters
    pub fn ensure_counters(&mut self) {
        let missing = self.action_triggers.iter().any(|trigger| {
            let Some(counter_type) = trigger.threshold_type.counter_type() else {
                return false;
            };
            let filter = trigger.counter_filter();
            !self
                .unit_counters
                .get(trigger.balance_type())
                .unwrap_or(&[])
                .iter()
                .any(|uc| uc.counter_type == counter_type && uc.has_counter(&filter))
        });
        if missing {
            self.init_counters();
        }
    }

    /// Feeds the unit counters and evaluates triggers
    pub fn count_units(
        &mut self,
        amount: Decimal,
        balance_type: &str,
        event: Option<&CounterEvent>,
        balance: Option<&Balance>,
        ctx: &ChargingContext<'_>,
    ) {
        self.ensure_counters();
        self.unit_counters.add_units(amount, balance_type, event, balance);
        self.execute_action_triggers(None, ctx);
    }

    /// One trigger evaluation pass
    ///
    /// Triggers run heaviest first and each fires at most once per pass.
    /// Balance thresholds only look at dirty balances; dirty flags are cleared
    /// and expired balances and triggers swept when the pass ends. Nested
    /// calls made by the actions of a firing trigger return immediately.
    #[instrument(skip(self, action, ctx), fields(account = %self.id))]
    pub fn execute_action_triggers(&mut self, action: Option<&Action>, ctx: &ChargingContext<'_>) {
        if self.executing_triggers {
            return;
        }
        self.executing_triggers = true;
        sort_triggers(&mut self.action_triggers);
        let now = Utc::now();
        for index in 0..self.action_triggers.len() {
            if self.should_fire(index, action, now) {
                self.fire_trigger(index, now, ctx);
            }
        }
        self.clean_expired_stuff(now);
        self.clear_dirty();
        self.executing_triggers = false;
    }

    fn should_fire(&self, index: usize, action: Option<&Action>, now: DateTime<Utc>) -> bool {
        let Some(trigger) = self.action_triggers.get(index) else {
            return false;
        };
        if trigger.executed
            || !trigger.is_active_at(now)
            || trigger.is_expired_at(now)
            || !trigger.matches_action(action)
        {
            return false;
        }
        let threshold = trigger.threshold_type;
        match threshold.metric() {
            ThresholdMetric::Counter(counter_type) => {
                let key = trigger.counter_filter();
                self.unit_counters
                    .iter()
                    .flat_map(|(_, counters)| counters.iter())
                    .filter(|uc| uc.counter_type == counter_type)
                    .flat_map(|uc| uc.counters.iter())
                    .any(|c| c.filter == key && threshold.crossed(c.value, trigger.threshold_value))
            }
            ThresholdMetric::Balance => self.balances(trigger.balance_type()).iter().any(|b| {
                b.is_dirty() && trigger.watches(b) && threshold.crossed(b.value(), trigger.threshold_value)
            }),
            ThresholdMetric::Expiry => self
                .balances(trigger.balance_type())
                .iter()
                .any(|b| trigger.watches(b) && b.is_expired_at(now)),
        }
    }

    fn fire_trigger(&mut self, index: usize, now: DateTime<Utc>, ctx: &ChargingContext<'_>) {
        let (unique_id, actions_id, recurrent) = match self.action_triggers.get_mut(index) {
            Some(trigger) => {
                if trigger.is_throttled(now) {
                    debug!(trigger = %trigger.unique_id, "recurrent trigger throttled");
                    return;
                }
                trigger.last_execution_time = Some(now);
                (trigger.unique_id.clone(), trigger.actions_id.clone(), trigger.recurrent)
            }
            None => return,
        };
        if self.disabled {
            warn!(account = %self.id, trigger = %unique_id, "account disabled, triggered actions not run");
            return;
        }
        let mut actions = match ctx.storage.get_actions(&actions_id) {
            Ok(actions) => actions,
            Err(e) => {
                error!(trigger = %unique_id, actions_id = %actions_id, error = %e, "failed to get actions");
                return;
            }
        };
        sort_actions(&mut actions);
        if let Some(trigger) = self.action_triggers.get_mut(index) {
            trigger.executed = true;
        }

        let mut failed = false;
        for action in &actions {
            let outcome = action
                .resolve_expiration(now)
                .and_then(|resolved| ctx.actions.execute(self, &resolved, &actions, ctx));
            if let Err(e) = outcome {
                error!(
                    trigger = %unique_id,
                    action_type = %action.action_type,
                    error = %e,
                    "triggered action failed"
                );
                failed = true;
                break;
            }
        }
        debug!(trigger = %unique_id, actions_id = %actions_id, failed, "trigger fired");
        if failed || recurrent {
            if let Some(trigger) = self.action_triggers.get_mut(index) {
                trigger.executed = false;
            }
        }
    }

    /// Re-arms the triggers the action addresses
    pub fn reset_action_triggers(&mut self, action: Option<&Action>) {
        for trigger in &mut self.action_triggers {
            if trigger.matches_action(action) {
                trigger.executed = false;
            }
        }
    }

    pub fn set_recurrent(&mut self, action: Option<&Action>, recurrent: bool) {
        for trigger in &mut self.action_triggers {
            if trigger.matches_action(action) {
                trigger.recurrent = recurrent;
            }
        }
    }

    /// Drops expired balances and expired triggers, rebuilding the counters
    /// when the trigger set shrinks
    pub fn clean_expired_stuff(&mut self, now: DateTime<Utc>) {
        for balances in self.balance_map.values_mut() {
            balances.retain(|b| !b.is_expired_at(now));
        }
        let before = self.action_triggers.len();
        self.action_triggers.retain(|t| !t.is_expired_at(now));
        if self.action_triggers.len() != before {
            self.init_counters();
        }
    }

    pub fn all_balances_expired(&self, now: DateTime<Utc>) -> bool {
        self.balance_map.values().flatten().all(|b| b.is_expired_at(now))
    }

    /// A copy for what-if pricing, without counters and triggers
    pub fn dry_run_clone(&self) -> Account {
        Account {
            id: self.id.clone(),
            balance_map: self.balance_map.clone(),
            unit_counters: UnitCounters::new(),
            action_triggers: Vec::new(),
            allow_negative: self.allow_negative,
            disabled: self.disabled,
            executing_triggers: false,
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        for balance in self.balance_map.values_mut().flatten() {
            balance.clear_dirty();
        }
    }

    /// Subtracts the action's value from every matching balance
    ///
    /// With `reset` the matching balances are zeroed first. When nothing
    /// matches, a balance is created from the filter holding the negated
    /// value and the account joins the shared groups it names.
    pub fn debit_balance_action(
        &mut self,
        action: &Action,
        reset: bool,
        ctx: &ChargingContext<'_>,
    ) -> Result<(), ChargingError> {
        let balance_type = action.balance_type();
        if balance_type.is_empty() {
            return Err(ChargingError::invalid_input("missing balance type"));
        }
        let now = Utc::now();
        let amount = action.balance.value();

        let mut found = false;
        if let Some(balances) = self.balance_map.get_mut(balance_type) {
            for balance in balances.iter_mut() {
                if balance.is_expired_at(now) || !balance.match_filter(&action.balance, false) {
                    continue;
                }
                if reset {
                    balance.set_value(Decimal::ZERO);
                }
                balance.subtract_value(amount);
                found = true;
            }
        }

        if !found {
            let mut balance = action.balance.create_balance();
            if balance.is_default() {
                balance = Balance::new_default();
                balance.mark_dirty();
            }
            balance.set_value(-amount);
            let groups: Vec<String> = balance.shared_groups.included_keys().map(str::to_string).collect();
            debug!(account = %self.id, balance_type, uuid = %balance.uuid, "created balance from action");
            self.add_balance(balance_type, balance);
            self.join_shared_groups(&groups, ctx)?;
        }

        self.init_counters();
        self.execute_action_triggers(None, ctx);
        Ok(())
    }

    /// Overwrites the balance addressed by uuid or id with the filter's
    /// fields, creating it when absent
    pub fn set_balance_action(&mut self, action: &Action, ctx: &ChargingContext<'_>) -> Result<(), ChargingError> {
        let balance_type = action.balance_type().to_string();
        if balance_type.is_empty() {
            return Err(ChargingError::invalid_input("missing balance type"));
        }
        let filter = &action.balance;
        let now = Utc::now();
        let balances = self.balance_map.entry(balance_type.clone()).or_default();
        let position = balances.iter().position(|b| {
            !b.is_expired_at(now)
                && (filter.uuid.map_or(false, |uuid| b.uuid == uuid)
                    || filter.id.as_deref().map_or(false, |id| b.id == id))
        });
        let (index, previous_groups) = match position {
            Some(index) => (index, Some(balances[index].shared_groups.clone())),
            None => {
                if let Some(uuid) = filter.uuid {
                    return Err(ChargingError::not_found("balance", uuid));
                }
                balances.push(Balance::default());
                (balances.len() - 1, None)
            }
        };

        let balance = &mut balances[index];
        if filter.id.as_deref().map_or(false, |id| id == META_DEFAULT) {
            balance.id = META_DEFAULT.to_string();
            if let Some(value) = filter.value {
                balance.set_value(value);
            }
        } else {
            filter.modify_balance(balance);
        }
        balance.mark_dirty();

        let groups_changed = previous_groups.as_ref() != Some(&balance.shared_groups);
        let groups: Vec<String> = balance.shared_groups.included_keys().map(str::to_string).collect();
        if groups_changed {
            self.join_shared_groups(&groups, ctx)?;
        }

        self.init_counters();
        self.execute_action_triggers(None, ctx);
        Ok(())
    }

    /// Removes every balance of the action's type matching its filter
    pub fn remove_balance_action(&mut self, action: &Action) -> Result<(), ChargingError> {
        let balance_type = action.balance_type();
        if balance_type.is_empty() {
            return Err(ChargingError::invalid_input("missing balance type"));
        }
        let balances = self
            .balance_map
            .get_mut(balance_type)
            .ok_or_else(|| ChargingError::not_found("balance type", balance_type))?;
        let before = balances.len();
        balances.retain(|b| !b.match_filter(&action.balance, false));
        if balances.len() == before {
            return Err(ChargingError::not_found("balance", action.balance.id()));
        }
        Ok(())
    }

    /// Applies the filter to every balance it addresses, the `disabled`
    /// field itself excluded from matching
    pub fn enable_disable_balance(&mut self, action: &Action) -> Result<(), ChargingError> {
        let mut lookup = action.balance.clone();
        lookup.disabled = None;
        let mut found = false;
        if let Some(balances) = self.balance_map.get_mut(action.balance_type()) {
            for balance in balances.iter_mut().filter(|b| b.match_filter(&lookup, false)) {
                action.balance.modify_balance(balance);
                found = true;
            }
        }
        if !found {
            return Err(ChargingError::not_found("balance", action.balance.id()));
        }
        Ok(())
    }

    /// Zeroes every balance and counter and re-arms every trigger
    pub fn reset(&mut self) {
        for balance in self.balance_map.values_mut().flatten() {
            balance.set_value(Decimal::ZERO);
        }
        self.unit_counters.reset_counters(None);
        for trigger in &mut self.action_triggers {
            trigger.executed = false;
        }
    }

    /// Returns what a paid increment took from this account's balances
    pub fn refund_increment(
        &mut self,
        increment: &Increment,
        cd: &CallDescriptor,
        count: bool,
        ctx: &ChargingContext<'_>,
    ) -> Result<(), ChargingError> {
        let event = if count {
            Some(CounterEvent::from_call_cost(
                &cd.create_call_cost(),
                ctx.storage,
                ctx.config.min_prefix_match,
            )?)
        } else {
            None
        };

        if let Some(unit) = &increment.balance_info.unit {
            let consumed = if unit.consumed.is_zero() { increment.units() } else { unit.consumed };
            let mut refunded = None;
            for balance_type in [cd.tor.as_str(), GENERIC] {
                let target = self
                    .balance_map
                    .get_mut(balance_type)
                    .and_then(|balances| balances.iter_mut().find(|b| b.uuid == unit.uuid));
                if let Some(balance) = target {
                    balance.add_value(consumed);
                    refunded = Some(balance.clone());
                    break;
                }
            }
            match refunded {
                Some(snapshot) => {
                    if count {
                        self.count_units(-consumed, &cd.tor, event.as_ref(), Some(&snapshot), ctx);
                    }
                }
                None => {
                    warn!(account = %self.id, uuid = %unit.uuid, "refund target unit balance not found");
                    return Ok(());
                }
            }
        }

        if let Some(monetary) = &increment.balance_info.monetary {
            let refunded = self
                .balance_map
                .get_mut(MONETARY)
                .and_then(|balances| balances.iter_mut().find(|b| b.uuid == monetary.uuid))
                .map(|balance| {
                    balance.add_value(increment.cost);
                    balance.clone()
                });
            match refunded {
                Some(snapshot) => {
                    if count {
                        self.count_units(-increment.cost, MONETARY, event.as_ref(), Some(&snapshot), ctx);
                    }
                }
                None => warn!(account = %self.id, uuid = %monetary.uuid, "refund target money balance not found"),
            }
        }
        Ok(())
    }

    fn join_shared_groups(&self, groups: &[String], ctx: &ChargingContext<'_>) -> Result<(), ChargingError> {
        if groups.is_empty() {
            return Ok(());
        }
        let locks: Vec<String> = groups.iter().map(|g| shared_group_lock_id(g)).collect();
        guard(ctx.guardian, &locks, ctx.config.lock_timeout(), || {
            for group_id in groups {
                match ctx.storage.get_shared_group(group_id, true) {
                    Ok(mut group) => {
                        if group.add_member(self.id.clone()) {
                            ctx.storage.set_shared_group(&group)?;
                            debug!(account = %self.id, shared_group = %group_id, "joined shared group");
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        warn!(shared_group = %group_id, "could not get shared group");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }
}
