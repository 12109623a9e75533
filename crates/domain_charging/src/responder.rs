//! Responder - the entry points of the charging core
//!
//! Every operation resolves the accounts it may mutate, takes their guardian
//! locks, works on freshly loaded copies and persists them before releasing
//! the locks.

use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use core_kernel::{round, AccountKey, RequestId};

use crate::account::Account;
use crate::account_set::AccountSet;
use crate::action::sort_actions;
use crate::call::{CallCost, CallDescriptor};
use crate::config::ChargingConfig;
use crate::constants::MONETARY;
use crate::context::ChargingContext;
use crate::debit::{debit_credit_balance, DebitOptions};
use crate::error::ChargingError;
use crate::ports::{guard, AccountingStorage, Guardian, RatingPort};
use crate::registry::{ActionRegistry, DEFAULT_ACTIONS};

/// Facade over the accounting core
pub struct Responder {
    storage: Arc<dyn AccountingStorage>,
    rater: Arc<dyn RatingPort>,
    guardian: Arc<dyn Guardian>,
    actions: Arc<ActionRegistry>,
    config: ChargingConfig,
}

impl Responder {
    pub fn new(
        storage: Arc<dyn AccountingStorage>,
        rater: Arc<dyn RatingPort>,
        guardian: Arc<dyn Guardian>,
        config: ChargingConfig,
    ) -> Self {
        Self {
            storage,
            rater,
            guardian,
            actions: Arc::new(DEFAULT_ACTIONS.clone()),
            config,
        }
    }

    /// Replaces the built-in action handlers
    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = Arc::new(actions);
        self
    }

    pub fn config(&self) -> &ChargingConfig {
        &self.config
    }

    pub fn storage(&self) -> &dyn AccountingStorage {
        self.storage.as_ref()
    }

    fn context(&self) -> ChargingContext<'_> {
        ChargingContext::new(
            self.storage.as_ref(),
            self.rater.as_ref(),
            self.guardian.as_ref(),
            self.actions.as_ref(),
            &self.config,
        )
    }

    fn load_account(&self, id: &AccountKey) -> Result<Account, ChargingError> {
        let account = self.storage.get_account(id).map_err(|e| {
            if e.is_not_found() {
                ChargingError::not_found("account", id)
            } else {
                e.into()
            }
        })?;
        if account.disabled {
            return Err(ChargingError::AccountDisabled(id.to_string()));
        }
        Ok(account)
    }

    fn prepare(&self, cd: &CallDescriptor) -> Result<CallDescriptor, ChargingError> {
        let mut cd = cd.clone();
        cd.normalize();
        cd.validate(self.config.max_call_duration())?;
        Ok(cd)
    }

    /// Lock names of the account behind `cd` and its shared-group peers
    fn lock_ids(&self, cd: &CallDescriptor) -> Result<Vec<String>, ChargingError> {
        let account = self.load_account(&cd.account_key())?;
        let members = account.unique_shared_group_members(cd, &self.context())?;
        Ok(members.into_iter().map(|id| id.to_string()).collect())
    }

    fn round_cost(&self, cc: &mut CallCost) {
        cc.cost = round(cc.cost, self.config.rounding_decimals, self.config.rounding_method);
    }

    /// Prices `cd` without touching any account
    #[instrument(skip(self, cd), fields(account = %cd.account, destination = %cd.destination))]
    pub fn get_cost(&self, cd: &CallDescriptor) -> Result<CallCost, ChargingError> {
        let cd = self.prepare(cd)?;
        let mut cc = self.rater.get_cost(&cd).map_err(ChargingError::Rating)?;
        self.round_cost(&mut cc);
        Ok(cc)
    }

    /// Charges the whole of `cd`, going negative on the default balance for
    /// whatever the balances cannot cover
    #[instrument(skip(self, cd), fields(request_id = %RequestId::new(), account = %cd.account, destination = %cd.destination))]
    pub fn debit(&self, cd: &CallDescriptor) -> Result<CallCost, ChargingError> {
        let cd = self.prepare(cd)?;
        let locks = self.lock_ids(&cd)?;
        debug!(locks = ?locks, "debiting");

        guard(self.guardian.as_ref(), &locks, self.config.lock_timeout(), || {
            let mut account = self.load_account(&cd.account_key())?;
            let cc = self.debit_locked(&mut account, &cd)?;
            self.storage.set_account(&account)?;
            info!(cost = %cc.cost, usage = %cc.duration(), "debited");
            Ok(cc)
        })
    }

    fn debit_locked(&self, account: &mut Account, cd: &CallDescriptor) -> Result<CallCost, ChargingError> {
        let ctx = self.context();
        let mut set = AccountSet::new(account);
        let mut cc = debit_credit_balance(&mut set, cd, DebitOptions::charge(), &ctx)?;
        self.round_cost(&mut cc);
        Ok(cc)
    }

    /// Usage the account can pay for `cd` without going into debt
    ///
    /// `None` means unlimited, as for accounts allowed to go negative. The
    /// result never exceeds the requested duration.
    #[instrument(skip(self, cd), fields(account = %cd.account, destination = %cd.destination))]
    pub fn max_session_duration(&self, cd: &CallDescriptor) -> Result<Option<Duration>, ChargingError> {
        let cd = self.prepare(cd)?;
        let locks = self.lock_ids(&cd)?;
        guard(self.guardian.as_ref(), &locks, self.config.lock_timeout(), || {
            let account = self.load_account(&cd.account_key())?;
            self.max_session_duration_locked(&account, &cd)
        })
    }

    fn max_session_duration_locked(
        &self,
        account: &Account,
        cd: &CallDescriptor,
    ) -> Result<Option<Duration>, ChargingError> {
        if account.allow_negative {
            return Ok(None);
        }
        let requested = cd.duration();
        let mut clone = account.dry_run_clone();
        let (default_uuid, mut default_value) = {
            let default = clone.get_default_money_balance();
            (default.uuid, default.value())
        };

        let ctx = self.context();
        let cc = {
            let mut set = AccountSet::new(&mut clone);
            debit_credit_balance(&mut set, cd, DebitOptions::simulate(), &ctx)?
        };

        let mut covered = Duration::zero();
        for inc in cc.increments() {
            if !inc.is_paid() {
                break;
            }
            if inc.balance_info.monetary.as_ref().map_or(false, |m| m.uuid == default_uuid) {
                default_value -= inc.cost;
                if default_value < Decimal::ZERO {
                    break;
                }
            }
            covered = covered + inc.duration;
            if covered >= requested {
                return Ok(Some(requested));
            }
        }
        debug!(covered = %covered, "max session duration");
        Ok(Some(core_kernel::min_duration(requested, covered)))
    }

    /// Debits as much of `cd` as the account can pay
    ///
    /// The request is shortened to the max session duration first; an
    /// account unable to pay anything is rejected.
    #[instrument(skip(self, cd), fields(request_id = %RequestId::new(), account = %cd.account, destination = %cd.destination))]
    pub fn max_debit(&self, cd: &CallDescriptor) -> Result<CallCost, ChargingError> {
        let mut cd = self.prepare(cd)?;
        let locks = self.lock_ids(&cd)?;

        guard(self.guardian.as_ref(), &locks, self.config.lock_timeout(), || {
            let mut account = self.load_account(&cd.account_key())?;
            if let Some(limit) = self.max_session_duration_locked(&account, &cd)? {
                if limit <= Duration::zero() && cd.duration() > Duration::zero() {
                    return Err(ChargingError::InsufficientCredit(cd.account_key().to_string()));
                }
                let requested = cd.duration();
                if limit < requested {
                    debug!(requested = %requested, limit = %limit, "shortening request");
                    cd.time_end = cd.time_start + limit;
                    cd.duration_index = cd.duration_index - (requested - limit);
                }
            }
            let cc = self.debit_locked(&mut account, &cd)?;
            self.storage.set_account(&account)?;
            info!(cost = %cc.cost, usage = %cc.duration(), "max debited");
            Ok(cc)
        })
    }

    /// Gives back what the paid increments of `cd` took
    ///
    /// Each increment is returned to the account recorded on it, falling
    /// back to the account of the request. Accounts that no longer exist are
    /// skipped.
    #[instrument(skip(self, cd), fields(account = %cd.account, increments = cd.increments.len()))]
    pub fn refund_increments(&self, cd: &CallDescriptor) -> Result<(), ChargingError> {
        let fallback = cd.account_key();
        let owners: BTreeSet<AccountKey> = cd
            .increments
            .iter()
            .map(|inc| inc.balance_info.account_id.clone().unwrap_or_else(|| fallback.clone()))
            .collect();
        if owners.is_empty() {
            return Ok(());
        }
        let locks: Vec<String> = owners.iter().map(ToString::to_string).collect();

        guard(self.guardian.as_ref(), &locks, self.config.lock_timeout(), || {
            let ctx = self.context();
            for owner in &owners {
                let mut account = match self.storage.get_account(owner) {
                    Ok(account) => account,
                    Err(e) if e.is_not_found() => {
                        warn!(account = %owner, "refund account not found");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let mine = cd
                    .increments
                    .iter()
                    .filter(|inc| inc.balance_info.account_id.as_ref().unwrap_or(&fallback) == owner);
                for increment in mine {
                    account.refund_increment(increment, cd, true, &ctx)?;
                }
                self.storage.set_account(&account)?;
            }
            Ok(())
        })
    }

    /// Runs the action set `actions_id` against an account
    ///
    /// Actions run heaviest first. A failing action stops the batch; the
    /// account is persisted with the effects of the actions that ran.
    #[instrument(skip(self), fields(account = %account_id))]
    pub fn execute_actions(&self, account_id: &AccountKey, actions_id: &str) -> Result<(), ChargingError> {
        let mut actions = self.storage.get_actions(actions_id).map_err(|e| {
            if e.is_not_found() {
                ChargingError::not_found("action set", actions_id)
            } else {
                e.into()
            }
        })?;
        sort_actions(&mut actions);
        let locks = vec![account_id.to_string()];

        guard(self.guardian.as_ref(), &locks, self.config.lock_timeout(), || {
            let mut account = match self.storage.get_account(account_id) {
                Ok(account) => account,
                Err(e) if e.is_not_found() => Account::new(account_id.clone()),
                Err(e) => return Err(e.into()),
            };
            let ctx = self.context();
            let now = chrono::Utc::now();
            let mut outcome = Ok(());
            for action in &actions {
                let run = action
                    .resolve_expiration(now)
                    .and_then(|resolved| ctx.actions.execute(&mut account, &resolved, &actions, &ctx));
                if let Err(e) = run {
                    warn!(action_type = %action.action_type, error = %e, "action failed, stopping batch");
                    outcome = Err(e);
                    break;
                }
            }
            self.storage.set_account(&account)?;
            debug!(money = %account.total_value(MONETARY), "actions executed");
            outcome
        })
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("actions", &self.actions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
