//! In-memory accounting storage
//!
//! Keeps accounts, shared groups, destinations and action sets in
//! `RwLock`-protected maps. Values are cloned on the way in and out, so the
//! engine always works on its own copy and only `set_*` calls publish
//! changes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, instrument};

use core_kernel::{AccountKey, DomainPort, PortError};
use domain_charging::{AccountingStorage, Account, Action, SharedGroup};

use crate::error::StoreError;

/// Serializable content of an [`InMemoryStorage`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StoreSnapshot {
    pub accounts: Vec<Account>,
    pub shared_groups: Vec<SharedGroup>,
    /// Destination id to the prefixes it contains
    pub destinations: BTreeMap<String, Vec<String>>,
    /// Action set id to its actions
    pub actions: BTreeMap<String, Vec<Action>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    accounts: RwLock<HashMap<AccountKey, Account>>,
    shared_groups: RwLock<HashMap<String, SharedGroup>>,
    destinations: RwLock<BTreeMap<String, Vec<String>>>,
    /// Prefix to the destination ids containing it
    reverse_destinations: RwLock<HashMap<String, BTreeSet<String>>>,
    actions: RwLock<HashMap<String, Vec<Action>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding everything in `snapshot`
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let store = Self::new();
        for mut account in snapshot.accounts {
            if account.id.as_str().is_empty() {
                return Err(StoreError::invalid("account without id"));
            }
            account.ensure_counters();
            store.accounts.write().insert(account.id.clone(), account);
        }
        for group in snapshot.shared_groups {
            if group.id.is_empty() {
                return Err(StoreError::invalid("shared group without id"));
            }
            store.shared_groups.write().insert(group.id.clone(), group);
        }
        for (id, prefixes) in snapshot.destinations {
            store.set_destination(&id, prefixes);
        }
        for (id, actions) in snapshot.actions {
            store.set_actions(&id, actions);
        }
        Ok(store)
    }

    /// Parses a JSON [`StoreSnapshot`]
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    /// Current content, accounts and groups sorted by id
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut accounts: Vec<Account> = self.accounts.read().values().cloned().collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        let mut shared_groups: Vec<SharedGroup> = self.shared_groups.read().values().cloned().collect();
        shared_groups.sort_by(|a, b| a.id.cmp(&b.id));
        StoreSnapshot {
            accounts,
            shared_groups,
            destinations: self.destinations.read().clone(),
            actions: self
                .actions
                .read()
                .iter()
                .map(|(id, actions)| (id.clone(), actions.clone()))
                .collect(),
        }
    }

    /// Registers a destination, replacing the prefixes it had
    pub fn set_destination(&self, id: &str, prefixes: Vec<String>) {
        let mut reverse = self.reverse_destinations.write();
        if let Some(old) = self.destinations.read().get(id) {
            for prefix in old {
                if let Some(ids) = reverse.get_mut(prefix) {
                    ids.remove(id);
                }
            }
        }
        for prefix in &prefixes {
            reverse.entry(prefix.clone()).or_default().insert(id.to_string());
        }
        reverse.retain(|_, ids| !ids.is_empty());
        self.destinations.write().insert(id.to_string(), prefixes);
    }

    pub fn set_actions(&self, id: &str, actions: Vec<Action>) {
        self.actions.write().insert(id.to_string(), actions);
    }

    pub fn remove_account(&self, id: &AccountKey) -> Option<Account> {
        self.accounts.write().remove(id)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }
}

impl DomainPort for InMemoryStorage {}

impl AccountingStorage for InMemoryStorage {
    fn get_account(&self, id: &AccountKey) -> Result<Account, PortError> {
        self.accounts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Account", id))
    }

    #[instrument(skip(self, account), fields(account = %account.id))]
    fn set_account(&self, account: &Account) -> Result<(), PortError> {
        if account.id.as_str().is_empty() {
            return Err(PortError::validation_field("account id is empty", "ID"));
        }
        debug!("storing account");
        self.accounts.write().insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn get_shared_group(&self, id: &str, _skip_cache: bool) -> Result<SharedGroup, PortError> {
        self.shared_groups
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PortError::not_found("SharedGroup", id))
    }

    fn set_shared_group(&self, group: &SharedGroup) -> Result<(), PortError> {
        if group.id.is_empty() {
            return Err(PortError::validation_field("shared group id is empty", "ID"));
        }
        self.shared_groups.write().insert(group.id.clone(), group.clone());
        Ok(())
    }

    fn get_reverse_destination(&self, prefix: &str) -> Result<Vec<String>, PortError> {
        self.reverse_destinations
            .read()
            .get(prefix)
            .map(|ids| ids.iter().cloned().collect())
            .ok_or_else(|| PortError::not_found("ReverseDestination", prefix))
    }

    fn get_actions(&self, id: &str) -> Result<Vec<Action>, PortError> {
        self.actions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PortError::not_found("ActionSet", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_destination_tracks_replacement() {
        let store = InMemoryStorage::new();
        store.set_destination("NAT", vec!["0723".to_string(), "0724".to_string()]);
        store.set_destination("RET", vec!["0723".to_string()]);
        assert_eq!(store.get_reverse_destination("0723").unwrap(), vec!["NAT", "RET"]);

        store.set_destination("NAT", vec!["0724".to_string()]);
        assert_eq!(store.get_reverse_destination("0723").unwrap(), vec!["RET"]);
        assert!(store.get_reverse_destination("0999").unwrap_err().is_not_found());
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let store = InMemoryStorage::new();
        let err = store.get_account(&AccountKey::new("cgrates.org", "nobody")).unwrap_err();
        assert!(err.is_not_found());
    }
}
