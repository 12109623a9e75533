//! The accounts one operation may touch
//!
//! A debit starts from the initiating account and lazily loads the
//! shared-group peers whose balances it draws from. Balances are addressed by
//! [`BalanceRef`] rather than by reference so several accounts can be mutated
//! within one operation.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use core_kernel::{AccountKey, BalanceUuid};

use crate::account::Account;
use crate::balance::Balance;
use crate::error::ChargingError;
use crate::ports::AccountingStorage;

/// Address of one balance inside an [`AccountSet`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BalanceRef {
    pub account: AccountKey,
    /// Map key the balance is stored under, `*generic` for generic balances
    pub balance_type: String,
    pub uuid: BalanceUuid,
}

pub struct AccountSet<'a> {
    primary: &'a mut Account,
    others: BTreeMap<AccountKey, Account>,
    unavailable: BTreeSet<AccountKey>,
    touched: BTreeSet<AccountKey>,
}

impl<'a> AccountSet<'a> {
    pub fn new(primary: &'a mut Account) -> Self {
        Self {
            primary,
            others: BTreeMap::new(),
            unavailable: BTreeSet::new(),
            touched: BTreeSet::new(),
        }
    }

    pub fn primary_id(&self) -> &AccountKey {
        &self.primary.id
    }

    pub fn primary(&self) -> &Account {
        &*self.primary
    }

    pub fn primary_mut(&mut self) -> &mut Account {
        self.touched.insert(self.primary.id.clone());
        &mut *self.primary
    }

    pub fn get(&self, id: &AccountKey) -> Option<&Account> {
        if id == &self.primary.id {
            Some(&*self.primary)
        } else {
            self.others.get(id)
        }
    }

    /// Mutable access, recording the account as touched
    pub fn get_mut(&mut self, id: &AccountKey) -> Option<&mut Account> {
        if id == &self.primary.id {
            self.touched.insert(id.clone());
            Some(&mut *self.primary)
        } else {
            let account = self.others.get_mut(id)?;
            self.touched.insert(id.clone());
            Some(account)
        }
    }

    /// Makes a shared-group peer available
    ///
    /// Returns false for peers that do not exist or are disabled; those are
    /// skipped by selection.
    pub fn load(&mut self, id: &AccountKey, storage: &dyn AccountingStorage) -> Result<bool, ChargingError> {
        if id == &self.primary.id || self.others.contains_key(id) {
            return Ok(true);
        }
        if self.unavailable.contains(id) {
            return Ok(false);
        }
        match storage.get_account(id) {
            Ok(account) if account.disabled => {
                debug!(account = %id, "skipping disabled shared group member");
                self.unavailable.insert(id.clone());
                Ok(false)
            }
            Ok(account) => {
                self.others.insert(id.clone(), account);
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                warn!(account = %id, "shared group member not found");
                self.unavailable.insert(id.clone());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn balance(&self, handle: &BalanceRef) -> Option<&Balance> {
        self.get(&handle.account)?
            .balance_map
            .get(&handle.balance_type)?
            .iter()
            .find(|b| b.uuid == handle.uuid)
    }

    pub fn balance_mut(&mut self, handle: &BalanceRef) -> Option<&mut Balance> {
        self.get_mut(&handle.account)?
            .balance_map
            .get_mut(&handle.balance_type)?
            .iter_mut()
            .find(|b| b.uuid == handle.uuid)
    }

    pub fn touched_ids(&self) -> Vec<AccountKey> {
        self.touched.iter().cloned().collect()
    }

    /// Peers mutated during the operation, for persisting
    pub fn touched_others(&self) -> impl Iterator<Item = &Account> {
        self.others
            .iter()
            .filter(|(id, _)| self.touched.contains(*id))
            .map(|(_, account)| account)
    }
}
