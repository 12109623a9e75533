//! Balance selection
//!
//! Picks, orders and expands the balances eligible to pay a request:
//!
//! 1. Balances of the requested type, plus `*generic` ones for unit types
//! 2. Disabled, expired and empty non-shared non-blocker balances are dropped
//! 3. Category, direction and destination rules must admit the request
//! 4. Survivors are ordered by weight, then by destination precision
//! 5. Balances tagged with shared groups are replaced by the pooled balances
//!    of every group member, ordered by the group's strategy

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::warn;

use crate::account::Account;
use crate::account_set::{AccountSet, BalanceRef};
use crate::constants::{GENERIC, MONETARY};
use crate::context::ChargingContext;
use crate::destination::match_destination;
use crate::error::ChargingError;
use crate::ports::AccountingStorage;

/// What a request needs paid
#[derive(Debug, Clone, Copy)]
pub struct BalanceQuery<'q> {
    pub destination: &'q str,
    pub category: &'q str,
    pub direction: &'q str,
    pub balance_type: &'q str,
    /// Restricts selection to balances of this shared group
    pub shared_group: Option<&'q str>,
}

impl<'q> BalanceQuery<'q> {
    pub fn new(destination: &'q str, category: &'q str, direction: &'q str, balance_type: &'q str) -> Self {
        Self {
            destination,
            category,
            direction,
            balance_type,
            shared_group: None,
        }
    }

    pub fn in_shared_group(self, group: &'q str) -> Self {
        Self {
            shared_group: Some(group),
            ..self
        }
    }
}

/// An eligible balance and the facts it was ordered by
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub handle: BalanceRef,
    pub weight: f64,
    pub value: Decimal,
    /// Length of the destination prefix that admitted the balance
    pub precision: usize,
}

/// Eligible balances of one account, heaviest and most precise first
pub fn select_balances(
    account: &Account,
    query: &BalanceQuery<'_>,
    storage: &dyn AccountingStorage,
    min_prefix_match: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, ChargingError> {
    let mut types = vec![query.balance_type];
    if query.balance_type != MONETARY && query.balance_type != GENERIC {
        types.push(GENERIC);
    }

    let mut selected = Vec::new();
    for balance_type in types {
        let Some(balances) = account.balance_map.get(balance_type) else {
            continue;
        };
        for balance in balances {
            if balance.disabled || balance.is_expired_at(now) {
                continue;
            }
            if balance.shared_groups.is_empty() && balance.value() <= Decimal::ZERO && !balance.blocker {
                continue;
            }
            if let Some(group) = query.shared_group {
                if !balance.shared_groups.includes(group) {
                    continue;
                }
            }
            if !balance.match_category(query.category) || !balance.match_direction(query.direction) {
                continue;
            }
            let precision = if balance.restricts_destinations() {
                match match_destination(&balance.destination_ids, query.destination, storage, min_prefix_match)? {
                    Some(precision) => precision,
                    None => continue,
                }
            } else {
                0
            };
            selected.push(Candidate {
                handle: BalanceRef {
                    account: account.id.clone(),
                    balance_type: balance_type.to_string(),
                    uuid: balance.uuid,
                },
                weight: balance.weight,
                value: balance.value(),
                precision,
            });
        }
    }

    sort_candidates(&mut selected);
    Ok(selected)
}

/// Stable order by weight, then precision, both descending
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| b.precision.cmp(&a.precision))
    });
}

/// Eligible balances of the initiating account with shared groups expanded
///
/// Every own balance tagged with shared groups is replaced, in place, by the
/// matching balances of all group members ordered by the group's strategy.
/// Missing groups are skipped; a balance whose groups are all missing is
/// charged as a plain own balance. A balance reachable through several groups is
/// kept at its first position only.
pub fn collect_balances(
    set: &mut AccountSet<'_>,
    query: &BalanceQuery<'_>,
    ctx: &ChargingContext<'_>,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>, ChargingError> {
    let min_prefix = ctx.config.min_prefix_match;
    let own = select_balances(set.primary(), query, ctx.storage, min_prefix, now)?;

    let mut expanded = Vec::with_capacity(own.len());
    for candidate in own {
        let groups: Vec<String> = set
            .balance(&candidate.handle)
            .map(|b| b.shared_groups.included_keys().map(str::to_string).collect())
            .unwrap_or_default();
        if groups.is_empty() {
            expanded.push(candidate);
            continue;
        }
        let mut resolved = false;
        for group_id in groups {
            let group = match ctx.storage.get_shared_group(&group_id, false) {
                Ok(group) => group,
                Err(e) if e.is_not_found() => {
                    warn!(shared_group = %group_id, "could not get shared group");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let group_query = query.in_shared_group(&group_id);
            let mut pool = Vec::new();
            for member in &group.member_ids {
                if !set.load(member, ctx.storage)? {
                    continue;
                }
                if let Some(account) = set.get(member) {
                    pool.extend(select_balances(account, &group_query, ctx.storage, min_prefix, now)?);
                }
            }
            let primary = set.primary_id().clone();
            expanded.extend(group.sort_by_strategy(&primary, &candidate.handle, pool));
            resolved = true;
        }
        if !resolved {
            expanded.push(candidate);
        }
    }

    let mut seen = HashSet::new();
    expanded.retain(|c| seen.insert(c.handle.clone()));
    Ok(expanded)
}
