//! Partial balance descriptions used by actions and triggers
//!
//! Every field is optional: a set field either constrains which balance is
//! addressed or, when a new balance is stamped from the filter, provides its
//! initial value.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::BalanceUuid;

use crate::balance::Balance;
use crate::string_map::StringMap;

/// Optional balance fields addressing or stamping a balance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BalanceFilter {
    pub uuid: Option<BalanceUuid>,
    #[serde(rename = "ID")]
    pub id: Option<String>,
    #[serde(rename = "Type")]
    pub balance_type: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub value: Option<Decimal>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub weight: Option<f64>,
    #[serde(rename = "DestinationIDs")]
    pub destination_ids: Option<StringMap>,
    pub rating_subject: Option<String>,
    pub categories: Option<StringMap>,
    pub shared_groups: Option<StringMap>,
    pub directions: Option<StringMap>,
    pub disabled: Option<bool>,
    pub blocker: Option<bool>,
}

impl BalanceFilter {
    /// A filter addressing every balance of one type
    pub fn of_type(balance_type: impl Into<String>) -> Self {
        Self {
            balance_type: Some(balance_type.into()),
            ..Default::default()
        }
    }

    pub fn balance_type(&self) -> &str {
        self.balance_type.as_deref().unwrap_or("")
    }

    pub fn value(&self) -> Decimal {
        self.value.unwrap_or(Decimal::ZERO)
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn shared_groups(&self) -> impl Iterator<Item = &str> {
        self.shared_groups.iter().flat_map(|sg| sg.included_keys())
    }

    /// Stamps a new balance from the set fields
    ///
    /// A fresh uuid is generated unless the filter names one. The new balance
    /// is dirty so the next trigger pass evaluates it.
    pub fn create_balance(&self) -> Balance {
        let mut balance = Balance::new(self.id(), self.value());
        if let Some(uuid) = self.uuid {
            balance.uuid = uuid;
        }
        balance.expiration_date = self.expiration_date;
        balance.weight = self.weight.unwrap_or(0.0);
        balance.destination_ids = self.destination_ids.clone().unwrap_or_default();
        balance.rating_subject = self.rating_subject.clone().unwrap_or_default();
        balance.categories = self.categories.clone().unwrap_or_default();
        balance.shared_groups = self.shared_groups.clone().unwrap_or_default();
        balance.directions = self.directions.clone().unwrap_or_default();
        balance.disabled = self.disabled.unwrap_or(false);
        balance.blocker = self.blocker.unwrap_or(false);
        balance.mark_dirty();
        balance
    }

    /// Overwrites the balance fields that are set on this filter
    pub fn modify_balance(&self, balance: &mut Balance) {
        if let Some(id) = &self.id {
            balance.id = id.clone();
        }
        if let Some(value) = self.value {
            balance.set_value(value);
        }
        if let Some(expiration_date) = self.expiration_date {
            balance.expiration_date = Some(expiration_date);
        }
        if let Some(weight) = self.weight {
            balance.weight = weight;
        }
        if let Some(destination_ids) = &self.destination_ids {
            balance.destination_ids = destination_ids.clone();
        }
        if let Some(rating_subject) = &self.rating_subject {
            balance.rating_subject = rating_subject.clone();
        }
        if let Some(categories) = &self.categories {
            balance.categories = categories.clone();
        }
        if let Some(shared_groups) = &self.shared_groups {
            balance.shared_groups = shared_groups.clone();
        }
        if let Some(directions) = &self.directions {
            balance.directions = directions.clone();
        }
        if let Some(disabled) = self.disabled {
            balance.disabled = disabled;
        }
        if let Some(blocker) = self.blocker {
            balance.blocker = blocker;
        }
        balance.mark_dirty();
    }

    /// Describes an existing balance, every field set
    pub fn load_from_balance(balance_type: &str, balance: &Balance) -> Self {
        Self {
            uuid: Some(balance.uuid),
            id: Some(balance.id.clone()),
            balance_type: Some(balance_type.to_string()),
            value: Some(balance.value()),
            expiration_date: balance.expiration_date,
            weight: Some(balance.weight),
            destination_ids: Some(balance.destination_ids.clone()),
            rating_subject: Some(balance.rating_subject.clone()),
            categories: Some(balance.categories.clone()),
            shared_groups: Some(balance.shared_groups.clone()),
            directions: Some(balance.directions.clone()),
            disabled: Some(balance.disabled),
            blocker: Some(balance.blocker),
        }
    }
}
