//! Balances - typed containers of consumable value
//!
//! A balance holds money or units (seconds, messages, bytes) together with the
//! rules deciding which requests it may pay for. Its value is only mutated
//! through the methods here so every change marks the balance dirty for the
//! next action-trigger evaluation pass.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::BalanceUuid;

use crate::balance_filter::BalanceFilter;
use crate::constants::{META_ANY, META_DEFAULT};
use crate::string_map::StringMap;

/// A single unit-of-value container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Balance {
    /// System-wide identity, assigned once
    #[serde(default)]
    pub uuid: BalanceUuid,
    /// Account-scoped identity; `*default` marks the debt-absorbing balance
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    /// Absent means the balance never expires
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Higher weight is selected first
    #[serde(default)]
    pub weight: f64,
    #[serde(rename = "DestinationIDs", default)]
    pub destination_ids: StringMap,
    #[serde(default)]
    pub rating_subject: String,
    #[serde(default)]
    pub categories: StringMap,
    #[serde(default)]
    pub shared_groups: StringMap,
    #[serde(default)]
    pub directions: StringMap,
    #[serde(default)]
    pub disabled: bool,
    /// Stop searching further balances once this one cannot pay
    #[serde(default)]
    pub blocker: bool,
    #[serde(skip)]
    dirty: bool,
}

impl Default for Balance {
    fn default() -> Self {
        Self::new("", Decimal::ZERO)
    }
}

impl Balance {
    /// Creates a clean balance with a fresh uuid and no filters
    pub fn new(id: impl Into<String>, value: Decimal) -> Self {
        Self {
            uuid: BalanceUuid::new(),
            id: id.into(),
            value,
            expiration_date: None,
            weight: 0.0,
            destination_ids: StringMap::new(),
            rating_subject: String::new(),
            categories: StringMap::new(),
            shared_groups: StringMap::new(),
            directions: StringMap::new(),
            disabled: false,
            blocker: false,
            dirty: false,
        }
    }

    /// The balance that absorbs debt when an account goes negative
    pub fn new_default() -> Self {
        Self::new(META_DEFAULT, Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn set_value(&mut self, value: Decimal) {
        self.value = value;
        self.dirty = true;
    }

    pub fn add_value(&mut self, amount: Decimal) {
        self.set_value(self.value + amount);
    }

    pub fn subtract_value(&mut self, amount: Decimal) {
        self.set_value(self.value - amount);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_default(&self) -> bool {
        self.id == META_DEFAULT
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Restricts destinations unless its rules are empty or include `*any`
    pub fn restricts_destinations(&self) -> bool {
        !self.destination_ids.is_empty() && !self.destination_ids.includes(META_ANY)
    }

    pub fn match_category(&self, category: &str) -> bool {
        self.categories.admits(category)
    }

    pub fn has_direction(&self) -> bool {
        !self.directions.is_empty()
    }

    pub fn match_direction(&self, direction: &str) -> bool {
        self.directions.admits(direction)
    }

    /// Whether this balance is the one an action or trigger addresses
    ///
    /// Identity fields (uuid, then id) decide alone when present unless
    /// `skip_ids` is set; the remaining set fields must all be satisfied,
    /// list-valued ones by inclusion.
    pub fn match_filter(&self, filter: &BalanceFilter, skip_ids: bool) -> bool {
        if !skip_ids {
            if let Some(uuid) = filter.uuid {
                return self.uuid == uuid;
            }
            if let Some(id) = filter.id.as_deref().filter(|id| !id.is_empty()) {
                return self.id == id;
            }
        }
        self.match_scalar_fields(filter)
            && filter.destination_ids.as_ref().map_or(true, |d| self.destination_ids.contains_all(d))
            && filter.directions.as_ref().map_or(true, |d| self.directions.contains_all(d))
            && filter.categories.as_ref().map_or(true, |c| self.categories.contains_all(c))
            && filter.shared_groups.as_ref().map_or(true, |s| self.shared_groups.contains_all(s))
    }

    /// Like [`Balance::match_filter`] but list-valued fields must be equal
    pub fn hard_match_filter(&self, filter: &BalanceFilter, skip_ids: bool) -> bool {
        if !skip_ids {
            if let Some(uuid) = filter.uuid {
                return self.uuid == uuid;
            }
            if let Some(id) = filter.id.as_deref().filter(|id| !id.is_empty()) {
                return self.id == id;
            }
        }
        self.match_scalar_fields(filter)
            && filter.destination_ids.as_ref().map_or(true, |d| &self.destination_ids == d)
            && filter.directions.as_ref().map_or(true, |d| &self.directions == d)
            && filter.categories.as_ref().map_or(true, |c| &self.categories == c)
            && filter.shared_groups.as_ref().map_or(true, |s| &self.shared_groups == s)
    }

    fn match_scalar_fields(&self, filter: &BalanceFilter) -> bool {
        filter.expiration_date.map_or(true, |exp| self.expiration_date == Some(exp))
            && filter.weight.map_or(true, |w| self.weight == w)
            && filter.blocker.map_or(true, |b| self.blocker == b)
            && filter.disabled.map_or(true, |d| self.disabled == d)
            && filter.rating_subject.as_ref().map_or(true, |r| &self.rating_subject == r)
    }
}

/// Sum of the values of a chain of balances
pub fn total_value<'a>(balances: impl IntoIterator<Item = &'a Balance>) -> Decimal {
    balances.into_iter().map(Balance::value).sum()
}
