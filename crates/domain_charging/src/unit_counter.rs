//! Unit counters feeding counter-type action triggers
//!
//! Counters are keyed by balance type. Each holds one accumulator per
//! distinct trigger filter; event counters accumulate usage of matching
//! requests, balance counters accumulate debits of matching balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::action::Action;
use crate::balance::Balance;
use crate::balance_filter::BalanceFilter;
use crate::call::CallCost;
use crate::destination::split_prefix;
use crate::error::ChargingError;
use crate::ports::AccountingStorage;

/// What a counter accumulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterType {
    /// Usage of requests matching the filter
    #[serde(rename = "*event")]
    Event,
    /// Debits of balances matching the filter
    #[serde(rename = "*balance")]
    Balance,
}

/// One accumulator and the filter it counts for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CounterFilter {
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub filter: BalanceFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitCounter {
    pub counter_type: CounterType,
    pub counters: Vec<CounterFilter>,
}

impl UnitCounter {
    pub fn new(counter_type: CounterType) -> Self {
        Self {
            counter_type,
            counters: Vec::new(),
        }
    }

    pub fn has_counter(&self, filter: &BalanceFilter) -> bool {
        self.counters.iter().any(|c| &c.filter == filter)
    }

    /// Copies accumulated values of identical filters from `old`
    ///
    /// Returns false when the counter types differ and nothing was copied.
    pub fn copy_counter_values(&mut self, old: &UnitCounter) -> bool {
        if self.counter_type != old.counter_type {
            return false;
        }
        for counter in &mut self.counters {
            if let Some(previous) = old.counters.iter().find(|c| c.filter == counter.filter) {
                counter.value = previous.value;
            }
        }
        true
    }
}

/// The request facts event counters are matched against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterEvent {
    pub category: String,
    pub direction: String,
    /// Every destination id the request's destination falls under
    pub destination_ids: BTreeSet<String>,
}

impl CounterEvent {
    /// Resolves the destination ids of a priced request once per debit
    pub fn from_call_cost(
        cc: &CallCost,
        storage: &dyn AccountingStorage,
        min_prefix_match: usize,
    ) -> Result<Self, ChargingError> {
        let mut destination_ids = BTreeSet::new();
        for prefix in split_prefix(&cc.destination, min_prefix_match) {
            match storage.get_reverse_destination(prefix) {
                Ok(ids) => destination_ids.extend(ids),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Self {
            category: cc.category.clone(),
            direction: cc.direction.clone(),
            destination_ids,
        })
    }

    /// Whether the request satisfies the category, direction and
    /// destination constraints of `filter`
    pub fn matches(&self, filter: &BalanceFilter) -> bool {
        if let Some(categories) = &filter.categories {
            if !self.category.is_empty() && !categories.includes(&self.category) {
                return false;
            }
        }
        if let Some(directions) = &filter.directions {
            if !self.direction.is_empty() && !directions.includes(&self.direction) {
                return false;
            }
        }
        match &filter.destination_ids {
            Some(destinations) if !destinations.is_empty() => {
                self.destination_ids.iter().any(|id| destinations.has_key(id))
            }
            _ => true,
        }
    }
}

/// Counters of an account keyed by balance type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCounters(BTreeMap<String, Vec<UnitCounter>>);

impl UnitCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, balance_type: &str) -> Option<&[UnitCounter]> {
        self.0.get(balance_type).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[UnitCounter])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns the counter of `counter_type` for `balance_type`, creating it
    pub fn counter_mut(&mut self, balance_type: &str, counter_type: CounterType) -> &mut UnitCounter {
        let counters = self.0.entry(balance_type.to_string()).or_default();
        let index = match counters.iter().position(|uc| uc.counter_type == counter_type) {
            Some(index) => index,
            None => {
                counters.push(UnitCounter::new(counter_type));
                counters.len() - 1
            }
        };
        &mut counters[index]
    }

    /// Adds `amount` to every counter of `balance_type` the event or the
    /// paying balance matches
    pub fn add_units(
        &mut self,
        amount: Decimal,
        balance_type: &str,
        event: Option<&CounterEvent>,
        balance: Option<&Balance>,
    ) {
        let Some(counters) = self.0.get_mut(balance_type) else {
            return;
        };
        for uc in counters {
            for counter in &mut uc.counters {
                let matched = match uc.counter_type {
                    CounterType::Event => event.map_or(false, |e| e.matches(&counter.filter)),
                    CounterType::Balance => balance.map_or(false, |b| b.match_filter(&counter.filter, true)),
                };
                if matched {
                    counter.value += amount;
                }
            }
        }
    }

    /// Zeroes counters addressed by `action`
    ///
    /// A balance type on the action limits the reset to that type; an id on
    /// the action further limits it to the counter created for that id.
    pub fn reset_counters(&mut self, action: Option<&Action>) {
        let balance_type = action.and_then(|a| a.balance.balance_type.as_deref());
        let id = action.and_then(|a| a.balance.id.as_deref()).filter(|id| !id.is_empty());
        for (key, counters) in &mut self.0 {
            if balance_type.map_or(false, |t| t != key) {
                continue;
            }
            for counter in counters.iter_mut().flat_map(|uc| uc.counters.iter_mut()) {
                if id.map_or(true, |id| counter.filter.id.as_deref() == Some(id)) {
                    counter.value = Decimal::ZERO;
                }
            }
        }
    }

    pub(crate) fn replace(&mut self, counters: BTreeMap<String, Vec<UnitCounter>>) {
        self.0 = counters;
    }

    pub(crate) fn take(&mut self) -> BTreeMap<String, Vec<UnitCounter>> {
        std::mem::take(&mut self.0)
    }
}
