//! Shared groups - balances pooled across accounts
//!
//! A balance tagged with a shared-group id makes the matching balances of
//! every member of that group eligible to pay the initiating account's
//! usage. The group's strategy for the initiating account orders the pooled
//! balances.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use core_kernel::AccountKey;

use crate::account_set::BalanceRef;
use crate::constants::{META_ANY, SHARED_GROUP_LOCK_PREFIX};
use crate::error::ChargingError;
use crate::selector::Candidate;

/// Ordering of pooled balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SharingStrategy {
    Highest,
    Lowest,
    MineHighest,
    MineLowest,
    Random,
    #[default]
    MineRandom,
}

impl SharingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingStrategy::Highest => "*highest",
            SharingStrategy::Lowest => "*lowest",
            SharingStrategy::MineHighest => "*mine_highest",
            SharingStrategy::MineLowest => "*mine_lowest",
            SharingStrategy::Random => "*random",
            SharingStrategy::MineRandom => "*mine_random",
        }
    }

    /// The initiating account's own balance is consumed first
    pub fn is_mine_first(&self) -> bool {
        matches!(
            self,
            SharingStrategy::MineHighest | SharingStrategy::MineLowest | SharingStrategy::MineRandom
        )
    }
}

impl fmt::Display for SharingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharingStrategy {
    type Err = ChargingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*highest" => Ok(SharingStrategy::Highest),
            "*lowest" => Ok(SharingStrategy::Lowest),
            "*mine_highest" => Ok(SharingStrategy::MineHighest),
            "*mine_lowest" => Ok(SharingStrategy::MineLowest),
            "*random" => Ok(SharingStrategy::Random),
            "*mine_random" | "" => Ok(SharingStrategy::MineRandom),
            other => Err(ChargingError::invalid_input(format!("unknown sharing strategy {}", other))),
        }
    }
}

impl TryFrom<String> for SharingStrategy {
    type Error = ChargingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SharingStrategy> for String {
    fn from(s: SharingStrategy) -> String {
        s.as_str().to_string()
    }
}

/// How one member (or `*any` member) draws from the group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SharingParameters {
    pub strategy: SharingStrategy,
    pub rating_subject: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharedGroup {
    #[serde(rename = "ID")]
    pub id: String,
    /// Keyed by member account id, `*any` applying to all others
    #[serde(default)]
    pub account_parameters: BTreeMap<String, SharingParameters>,
    #[serde(rename = "MemberIDs", default)]
    pub member_ids: BTreeSet<AccountKey>,
}

impl SharedGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sets the strategy used by every member without own parameters
    pub fn with_strategy(mut self, strategy: SharingStrategy) -> Self {
        self.account_parameters.insert(
            META_ANY.to_string(),
            SharingParameters {
                strategy,
                rating_subject: String::new(),
            },
        );
        self
    }

    pub fn with_member(mut self, member: AccountKey) -> Self {
        self.member_ids.insert(member);
        self
    }

    pub fn has_member(&self, member: &AccountKey) -> bool {
        self.member_ids.contains(member)
    }

    /// Adds a member, returning false when it already belonged to the group
    pub fn add_member(&mut self, member: AccountKey) -> bool {
        self.member_ids.insert(member)
    }

    /// The sharing parameters applying to `account`
    pub fn parameters_for(&self, account: &AccountKey) -> Option<&SharingParameters> {
        self.account_parameters
            .get(account.as_str())
            .or_else(|| self.account_parameters.get(META_ANY))
    }

    pub fn strategy_for(&self, account: &AccountKey) -> SharingStrategy {
        self.parameters_for(account).map(|p| p.strategy).unwrap_or_default()
    }

    /// Orders a pool of member balances for the initiating `account`
    ///
    /// Value orderings are stable so ties keep their pooled order. Mine-first
    /// strategies then move `mine` to the front without reordering the rest.
    pub fn sort_by_strategy(
        &self,
        account: &AccountKey,
        mine: &BalanceRef,
        mut pool: Vec<Candidate>,
    ) -> Vec<Candidate> {
        let strategy = self.strategy_for(account);
        match strategy {
            SharingStrategy::Highest | SharingStrategy::MineHighest => {
                pool.sort_by(|a, b| b.value.cmp(&a.value));
            }
            SharingStrategy::Lowest | SharingStrategy::MineLowest => {
                pool.sort_by(|a, b| a.value.cmp(&b.value));
            }
            SharingStrategy::Random | SharingStrategy::MineRandom => {
                pool.shuffle(&mut rand::thread_rng());
            }
        }
        if strategy.is_mine_first() {
            if let Some(index) = pool.iter().position(|c| &c.handle == mine) {
                let own = pool.remove(index);
                pool.insert(0, own);
            }
        }
        pool
    }
}

/// Guardian resource id of a shared group
pub fn shared_group_lock_id(group_id: &str) -> String {
    format!("{}{}", SHARED_GROUP_LOCK_PREFIX, group_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::BalanceUuid;
    use rust_decimal::Decimal;

    fn candidate(account: &str, value: i64) -> Candidate {
        Candidate {
            handle: BalanceRef {
                account: AccountKey::new("cgrates.org", account),
                balance_type: "*monetary".to_string(),
                uuid: BalanceUuid::new(),
            },
            weight: 0.0,
            value: Decimal::from(value),
            precision: 0,
        }
    }

    #[test]
    fn test_strategy_falls_back_to_any() {
        let rif = AccountKey::new("cgrates.org", "rif");
        let group = SharedGroup::new("SG1");
        assert_eq!(group.strategy_for(&rif), SharingStrategy::MineRandom);

        let group = group.with_strategy(SharingStrategy::Highest);
        assert_eq!(group.strategy_for(&rif), SharingStrategy::Highest);
    }

    #[test]
    fn test_mine_highest_keeps_rest_ordered() {
        let rif = AccountKey::new("cgrates.org", "rif");
        let group = SharedGroup::new("SG1").with_strategy(SharingStrategy::MineHighest);
        let pool = vec![candidate("a", 5), candidate("rif", 1), candidate("b", 9)];
        let mine = pool[1].handle.clone();

        let sorted = group.sort_by_strategy(&rif, &mine, pool);
        let values: Vec<_> = sorted.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![Decimal::ONE, Decimal::from(9), Decimal::from(5)]);
    }

    #[test]
    fn test_lowest_is_stable() {
        let rif = AccountKey::new("cgrates.org", "rif");
        let group = SharedGroup::new("SG1").with_strategy(SharingStrategy::Lowest);
        let pool = vec![candidate("a", 3), candidate("b", 3), candidate("c", 1)];
        let first_tie = pool[0].handle.clone();

        let sorted = group.sort_by_strategy(&rif, &first_tie, pool);
        assert_eq!(sorted[0].value, Decimal::ONE);
        assert_eq!(sorted[1].handle, first_tie);
    }

    #[test]
    fn test_strategy_tags() {
        assert_eq!("*mine_lowest".parse::<SharingStrategy>().unwrap(), SharingStrategy::MineLowest);
        assert_eq!("".parse::<SharingStrategy>().unwrap(), SharingStrategy::MineRandom);
        assert!("*sideways".parse::<SharingStrategy>().is_err());
    }
}
