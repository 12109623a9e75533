//! Debit engine
//!
//! Pays a rated request from the eligible balances of an account and its
//! shared-group peers:
//!
//! 1. Unit balances pay consumed usage, either at zero cost (`*zero`
//!    rating subjects) or at the price the rater quotes for the balance's own
//!    rating subject, with money co-paid from the first money balance able to
//!    cover each increment.
//! 2. Money balances pay the priced increments.
//! 3. Both phases repeat while any balance made progress.
//! 4. The uncovered remainder is re-rated; a free remainder is attached as
//!    is, a priced one is charged to the default money balance when going
//!    negative is permitted and left out of the result otherwise.
//!
//! The connect fee is charged once per request, by the first part that
//! settles it.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use core_kernel::AccountKey;

use crate::account_set::{AccountSet, BalanceRef};
use crate::call::{CallCost, CallDescriptor, MaxCostStrategy, MonetaryInfo, TimeSpan, UnitInfo};
use crate::constants::{MONETARY, ZERO_RATING_SUBJECT_PREFIX};
use crate::context::ChargingContext;
use crate::error::ChargingError;
use crate::selector::{collect_balances, BalanceQuery, Candidate};
use crate::unit_counter::CounterEvent;

/// Flags of one debit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebitOptions {
    /// Feed unit counters and evaluate triggers while paying
    pub count: bool,
    /// Simulate only; blockers and max-cost disconnects end the run early
    pub dry_run: bool,
    /// Charge any priced remainder to the default money balance
    pub go_negative: bool,
}

impl DebitOptions {
    /// A committed debit that may put the account into debt
    pub fn charge() -> Self {
        Self {
            count: true,
            dry_run: false,
            go_negative: true,
        }
    }

    /// A what-if run that never goes negative
    pub fn simulate() -> Self {
        Self {
            count: false,
            dry_run: true,
            go_negative: false,
        }
    }
}

/// Result of trying to settle the connect fee
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFeeOutcome {
    /// Paid, by the given balance unless the fee was zero
    Paid(Option<BalanceRef>),
    /// A blocker balance unable to pay stopped the search
    Blocked,
    /// No balance could pay and debt was not permitted
    Unpaid,
}

/// Increment length of a `*zeroN<unit>` rating subject
///
/// A bare number counts seconds; units are `s`, `m` and `h`. Returns `None`
/// for sub-second units and other subjects.
pub fn parse_zero_rating_subject(subject: &str) -> Option<Duration> {
    let suffix = subject.trim().strip_prefix(ZERO_RATING_SUBJECT_PREFIX)?;
    let split = suffix.find(|c: char| !c.is_ascii_digit()).unwrap_or(suffix.len());
    let (digits, unit) = suffix.split_at(split);
    let amount: i64 = digits.parse().ok()?;
    let increment = match unit {
        "" | "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        _ => return None,
    };
    (increment > Duration::zero()).then_some(increment)
}

/// A rating subject that overrides the request's subject
fn overrides_subject(subject: &str) -> bool {
    !subject.is_empty() && !subject.starts_with(ZERO_RATING_SUBJECT_PREFIX)
}

/// Time spans paid by one balance in one attempt
struct Part {
    timespans: Vec<TimeSpan>,
    max_cost_disconnect: bool,
}

impl Part {
    fn new(timespans: Vec<TimeSpan>, max_cost_disconnect: bool) -> Option<Self> {
        if timespans.is_empty() && !max_cost_disconnect {
            return None;
        }
        Some(Self {
            timespans,
            max_cost_disconnect,
        })
    }
}

/// Drops the unpaid tail starting at the given increment
fn cut_unpaid(timespans: &mut Vec<TimeSpan>, ts_index: usize, inc_index: usize) {
    if inc_index == 0 {
        timespans.truncate(ts_index);
    } else {
        timespans[ts_index].truncate_at(inc_index);
        timespans.truncate(ts_index + 1);
    }
}

/// Pays `cd` from the balances reachable from the set's primary account
///
/// Unless `dry_run` is set, touched shared-group peers are persisted and
/// every touched account gets a final trigger pass. The primary account is
/// left for the caller to persist.
#[instrument(
    skip(set, cd, ctx),
    fields(account = %set.primary_id(), destination = %cd.destination, dry_run = opts.dry_run)
)]
pub fn debit_credit_balance(
    set: &mut AccountSet<'_>,
    cd: &CallDescriptor,
    opts: DebitOptions,
    ctx: &ChargingContext<'_>,
) -> Result<CallCost, ChargingError> {
    let now = Utc::now();
    let mut cd = cd.clone();
    cd.normalize();

    let units = if cd.tor == MONETARY {
        Vec::new()
    } else {
        let query = BalanceQuery::new(&cd.destination, &cd.category, &cd.direction, &cd.tor);
        collect_balances(set, &query, ctx, now)?
    };
    let money = {
        let query = BalanceQuery::new(&cd.destination, &cd.category, &cd.direction, MONETARY);
        collect_balances(set, &query, ctx, now)?
    };
    debug!(units = units.len(), money = money.len(), "candidate balances");

    let event = if opts.count && !opts.dry_run {
        Some(CounterEvent::from_call_cost(
            &cd.create_call_cost(),
            ctx.storage,
            ctx.config.min_prefix_match,
        )?)
    } else {
        None
    };

    let result = cd.create_call_cost();
    let mut engine = DebitEngine {
        set,
        ctx: *ctx,
        cd,
        opts,
        event,
        money,
        result,
        connect_fee_settled: false,
        had_balance_subject: false,
    };
    engine.run(&units)
}

struct DebitEngine<'s, 'a, 'c> {
    set: &'s mut AccountSet<'a>,
    ctx: ChargingContext<'c>,
    /// Uncovered part of the request, its start advancing as parts are paid
    cd: CallDescriptor,
    opts: DebitOptions,
    event: Option<CounterEvent>,
    money: Vec<Candidate>,
    result: CallCost,
    connect_fee_settled: bool,
    had_balance_subject: bool,
}

impl<'s, 'a, 'c> DebitEngine<'s, 'a, 'c> {
    fn run(&mut self, units: &[Candidate]) -> Result<CallCost, ChargingError> {
        let mut progress = true;
        while progress && !self.covered() {
            progress = false;

            let mut unit_progress = true;
            while unit_progress && !self.covered() {
                unit_progress = false;
                for candidate in units {
                    if self.covered() {
                        break;
                    }
                    let Some((subject, blocker)) = self
                        .set
                        .balance(&candidate.handle)
                        .map(|b| (b.rating_subject.clone(), b.blocker))
                    else {
                        continue;
                    };
                    if overrides_subject(&subject) {
                        self.had_balance_subject = true;
                    }
                    if let Some(part) = self.debit_units(&candidate.handle, &subject)? {
                        let disconnect = part.max_cost_disconnect;
                        if self.absorb(part) {
                            unit_progress = true;
                            progress = true;
                        }
                        if self.opts.dry_run && disconnect {
                            return Ok(self.finish());
                        }
                    }
                    if self.opts.dry_run && blocker {
                        debug!(uuid = %candidate.handle.uuid, "blocker reached in dry run");
                        return Ok(self.finish());
                    }
                }
            }

            let money = self.money.clone();
            let mut money_progress = true;
            while money_progress && !self.covered() {
                money_progress = false;
                for candidate in &money {
                    if self.covered() {
                        break;
                    }
                    let Some((subject, blocker)) = self
                        .set
                        .balance(&candidate.handle)
                        .map(|b| (b.rating_subject.clone(), b.blocker))
                    else {
                        continue;
                    };
                    if overrides_subject(&subject) {
                        self.had_balance_subject = true;
                    }
                    if let Some(part) = self.debit_money(&candidate.handle, &subject)? {
                        let disconnect = part.max_cost_disconnect;
                        if self.absorb(part) {
                            money_progress = true;
                            progress = true;
                        }
                        if self.opts.dry_run && disconnect {
                            return Ok(self.finish());
                        }
                    }
                    if self.opts.dry_run && blocker {
                        debug!(uuid = %candidate.handle.uuid, "blocker reached in dry run");
                        return Ok(self.finish());
                    }
                }
            }
        }

        if !self.covered() {
            self.settle_remainder()?;
        }
        self.commit()?;
        Ok(self.finish())
    }

    fn covered(&self) -> bool {
        self.cd.time_start >= self.cd.time_end
    }

    /// Appends a paid part and advances the uncovered window
    ///
    /// Returns true when the part paid usage.
    fn absorb(&mut self, part: Part) -> bool {
        self.result.max_cost_disconnect |= part.max_cost_disconnect;
        let end: Option<DateTime<Utc>> = part.timespans.last().map(|ts| ts.time_end);
        let paid_any = part.timespans.iter().any(|ts| !ts.increments.is_empty());
        self.result.timespans.extend(part.timespans);
        match end {
            Some(end) if end > self.cd.time_start => {
                self.cd.time_start = end;
                paid_any
            }
            _ => false,
        }
    }

    fn wants_connect_fee(&self) -> bool {
        self.result.deduct_connect_fee && !self.connect_fee_settled
    }

    fn rate(&self, subject: &str) -> Result<CallCost, ChargingError> {
        let cd = if overrides_subject(subject) {
            self.cd.with_rating_subject(subject)
        } else {
            self.cd.clone()
        };
        self.ctx.rater.get_cost(&cd).map_err(ChargingError::Rating)
    }

    fn count(&mut self, owner: &AccountKey, amount: Decimal, balance_type: &str, paying: &BalanceRef) {
        if !self.opts.count || self.opts.dry_run {
            return;
        }
        let snapshot = self.set.balance(paying).cloned();
        let ctx = self.ctx;
        if let Some(account) = self.set.get_mut(owner) {
            account.count_units(amount, balance_type, self.event.as_ref(), snapshot.as_ref(), &ctx);
        }
    }

    /// Settles the connect fee from the money candidates
    ///
    /// A blocker that cannot pay ends the search when `block` is set. With
    /// `allow_debt` the fee falls back to the primary account's default
    /// balance.
    fn debit_connection_fee(
        &mut self,
        connect_fee: Decimal,
        block: bool,
        allow_debt: bool,
    ) -> ConnectFeeOutcome {
        if connect_fee <= Decimal::ZERO {
            self.connect_fee_settled = true;
            return ConnectFeeOutcome::Paid(None);
        }
        for index in 0..self.money.len() {
            let handle = self.money[index].handle.clone();
            let Some(balance) = self.set.balance_mut(&handle) else {
                continue;
            };
            if balance.value() >= connect_fee {
                balance.subtract_value(connect_fee);
                self.settle_connect_fee(connect_fee);
                let owner = handle.account.clone();
                self.count(&owner, connect_fee, MONETARY, &handle);
                return ConnectFeeOutcome::Paid(Some(handle));
            }
            if balance.blocker && block {
                return ConnectFeeOutcome::Blocked;
            }
        }
        if !allow_debt {
            return ConnectFeeOutcome::Unpaid;
        }

        let owner = self.set.primary_id().clone();
        let default = self.set.primary_mut().get_default_money_balance();
        default.subtract_value(connect_fee);
        let handle = BalanceRef {
            account: owner.clone(),
            balance_type: MONETARY.to_string(),
            uuid: default.uuid,
        };
        self.result.negative_connect_fee = true;
        self.settle_connect_fee(connect_fee);
        self.count(&owner, connect_fee, MONETARY, &handle);
        ConnectFeeOutcome::Paid(Some(handle))
    }

    fn settle_connect_fee(&mut self, connect_fee: Decimal) {
        self.connect_fee_settled = true;
        self.result.connect_fee = connect_fee;
        // later ratings must not price the fee again
        self.cd.loop_index = self.cd.loop_index.max(1);
    }

    /// Charges the connect fee of a rated part, `false` when the part may
    /// not be paid
    fn settle_part_connect_fee(&mut self, cc: &CallCost) -> bool {
        if !self.wants_connect_fee() {
            return true;
        }
        match self.debit_connection_fee(cc.connect_fee, true, self.opts.go_negative) {
            ConnectFeeOutcome::Paid(_) => true,
            ConnectFeeOutcome::Blocked | ConnectFeeOutcome::Unpaid => false,
        }
    }

    fn debit_units(&mut self, handle: &BalanceRef, subject: &str) -> Result<Option<Part>, ChargingError> {
        let Some(balance) = self.set.balance(handle) else {
            return Ok(None);
        };
        if balance.disabled || balance.is_expired_at(self.cd.time_start) || balance.value() <= Decimal::ZERO {
            return Ok(None);
        }
        let zero_subject = if subject.is_empty() {
            self.ctx.config.default_unit_rating_subject.as_str()
        } else {
            subject
        };
        match parse_zero_rating_subject(zero_subject) {
            Some(increment) => Ok(self.debit_zero_units(handle, increment)),
            None => self.debit_rated(handle, subject, true),
        }
    }

    /// Consumes the uncovered window in fixed increments at zero cost
    fn debit_zero_units(&mut self, handle: &BalanceRef, increment: Duration) -> Option<Part> {
        let mut ts = TimeSpan::new(self.cd.time_start, self.cd.time_end);
        ts.duration_index = self.cd.duration_index;
        ts.fill_zero_cost_increments(increment);

        let mut paid = 0;
        for inc in ts.increments.iter_mut() {
            let amount = inc.units();
            let Some(balance) = self.set.balance_mut(handle) else {
                break;
            };
            if balance.value() < amount {
                break;
            }
            balance.subtract_value(amount);
            inc.balance_info.unit = Some(UnitInfo {
                uuid: balance.uuid,
                id: balance.id.clone(),
                value: balance.value(),
                destination_id: self.cd.destination.clone(),
                consumed: amount,
                tor: self.cd.tor.clone(),
            });
            inc.balance_info.account_id = Some(handle.account.clone());
            inc.cost = Decimal::ZERO;
            inc.paid = true;
            paid += 1;
            let tor = self.cd.tor.clone();
            self.count(&handle.account, amount, &tor, handle);
        }
        if paid == 0 {
            return None;
        }
        if paid < ts.increments.len() {
            ts.truncate_at(paid);
        }
        Part::new(vec![ts], false)
    }

    fn debit_money(&mut self, handle: &BalanceRef, subject: &str) -> Result<Option<Part>, ChargingError> {
        let Some(balance) = self.set.balance(handle) else {
            return Ok(None);
        };
        if balance.disabled || balance.is_expired_at(self.cd.time_start) || balance.value() <= Decimal::ZERO {
            return Ok(None);
        }
        self.debit_rated(handle, subject, false)
    }

    /// Pays the increments the rater quotes, in order, until one cannot be
    /// paid
    ///
    /// With `units` the balance pays usage and money co-pays the price;
    /// otherwise the balance pays the price itself.
    fn debit_rated(&mut self, handle: &BalanceRef, subject: &str, units: bool) -> Result<Option<Part>, ChargingError> {
        let mut cc = self.rate(subject)?;
        if !self.settle_part_connect_fee(&cc) {
            return Ok(None);
        }

        let mut max_cost_disconnect = false;
        for ts_index in 0..cc.timespans.len() {
            let max_cost = cc.timespans[ts_index].max_cost;
            for inc_index in 0..cc.timespans[ts_index].increments.len() {
                if let Some(cap) = max_cost.filter(|cap| self.cd.max_cost_so_far >= cap.amount) {
                    match cap.strategy {
                        MaxCostStrategy::Disconnect => {
                            max_cost_disconnect = true;
                            if self.opts.dry_run {
                                cut_unpaid(&mut cc.timespans, ts_index, inc_index);
                                return Ok(Part::new(cc.timespans, true));
                            }
                        }
                        MaxCostStrategy::Free => {
                            let inc = &mut cc.timespans[ts_index].increments[inc_index];
                            inc.cost = Decimal::ZERO;
                            inc.balance_info.account_id = Some(handle.account.clone());
                            inc.paid = true;
                            continue;
                        }
                    }
                }

                let paid = if units {
                    self.pay_unit_increment(handle, &mut cc, ts_index, inc_index)
                } else {
                    self.pay_money_increment(handle, &mut cc, ts_index, inc_index)
                };
                if !paid {
                    cut_unpaid(&mut cc.timespans, ts_index, inc_index);
                    return Ok(Part::new(cc.timespans, max_cost_disconnect));
                }
            }
        }
        Ok(Part::new(cc.timespans, max_cost_disconnect))
    }

    fn pay_unit_increment(&mut self, handle: &BalanceRef, cc: &mut CallCost, ts_index: usize, inc_index: usize) -> bool {
        let (amount, cost) = {
            let inc = &cc.timespans[ts_index].increments[inc_index];
            (inc.units(), inc.cost)
        };
        if !self.set.balance(handle).map_or(false, |b| b.value() >= amount) {
            return false;
        }
        let co_payer = if cost.is_zero() {
            None
        } else {
            let found = self
                .money
                .iter()
                .find(|c| self.set.balance(&c.handle).map_or(false, |b| b.value() >= cost))
                .map(|c| c.handle.clone());
            match found {
                Some(handle) => Some(handle),
                None => return false,
            }
        };

        let Some(balance) = self.set.balance_mut(handle) else {
            return false;
        };
        balance.subtract_value(amount);
        let unit_info = UnitInfo {
            uuid: balance.uuid,
            id: balance.id.clone(),
            value: balance.value(),
            destination_id: self.cd.destination.clone(),
            consumed: amount,
            tor: self.cd.tor.clone(),
        };
        let monetary_info = co_payer.as_ref().and_then(|payer| {
            let money = self.set.balance_mut(payer)?;
            money.subtract_value(cost);
            Some(MonetaryInfo {
                uuid: money.uuid,
                id: money.id.clone(),
                value: money.value(),
            })
        });
        if monetary_info.is_some() {
            self.cd.max_cost_so_far += cost;
        }

        let inc = &mut cc.timespans[ts_index].increments[inc_index];
        inc.balance_info.unit = Some(unit_info);
        inc.balance_info.monetary = monetary_info;
        inc.balance_info.account_id = Some(handle.account.clone());
        inc.paid = true;

        let tor = self.cd.tor.clone();
        self.count(&handle.account, amount, &tor, handle);
        if let Some(payer) = co_payer {
            self.count(&payer.account, cost, MONETARY, &payer);
        }
        true
    }

    fn pay_money_increment(&mut self, handle: &BalanceRef, cc: &mut CallCost, ts_index: usize, inc_index: usize) -> bool {
        let cost = cc.timespans[ts_index].increments[inc_index].cost;
        let Some(balance) = self.set.balance_mut(handle) else {
            return false;
        };
        if balance.value() < cost {
            return false;
        }
        balance.subtract_value(cost);
        let info = MonetaryInfo {
            uuid: balance.uuid,
            id: balance.id.clone(),
            value: balance.value(),
        };
        self.cd.max_cost_so_far += cost;

        let inc = &mut cc.timespans[ts_index].increments[inc_index];
        inc.balance_info.monetary = Some(info);
        inc.balance_info.account_id = Some(handle.account.clone());
        inc.paid = true;

        self.count(&handle.account, cost, MONETARY, handle);
        true
    }

    /// Re-rates the uncovered window and pays it free or into debt
    fn settle_remainder(&mut self) -> Result<(), ChargingError> {
        if self.had_balance_subject {
            debug!("re-rating remainder under the request's own subject");
        }
        let mut left = self.rate("")?;
        let owner = self.set.primary_id().clone();
        let fee = if self.wants_connect_fee() { left.connect_fee } else { Decimal::ZERO };
        let left_cost = left.timespans_cost() + fee;

        if left_cost.is_zero() {
            if self.wants_connect_fee() {
                self.connect_fee_settled = true;
            }
            for inc in left.timespans.iter_mut().flat_map(|ts| ts.increments.iter_mut()) {
                inc.balance_info.account_id = Some(owner.clone());
                inc.paid = true;
            }
            self.result.timespans.extend(left.timespans);
            return Ok(());
        }
        if !self.opts.go_negative {
            debug!(cost = %left_cost, "remainder left unpaid");
            return Ok(());
        }

        if self.result.timespans.is_empty() && self.wants_connect_fee() {
            self.debit_connection_fee(left.connect_fee, false, true);
        }
        if !self.set.primary().allow_negative && !self.opts.dry_run {
            warn!(account = %owner, cost = %left_cost, "going negative on account that does not allow it");
        }

        for ts in left.timespans.iter_mut() {
            for inc in ts.increments.iter_mut() {
                let cost = inc.cost;
                let default = self.set.primary_mut().get_default_money_balance();
                default.subtract_value(cost);
                let handle = BalanceRef {
                    account: owner.clone(),
                    balance_type: MONETARY.to_string(),
                    uuid: default.uuid,
                };
                inc.balance_info.monetary = Some(MonetaryInfo {
                    uuid: default.uuid,
                    id: default.id.clone(),
                    value: default.value(),
                });
                inc.balance_info.account_id = Some(owner.clone());
                inc.paid = true;
                self.count(&owner, cost, MONETARY, &handle);
            }
        }
        self.result.timespans.extend(left.timespans);
        Ok(())
    }

    /// Runs a final trigger pass on touched accounts and persists the
    /// touched peers
    fn commit(&mut self) -> Result<(), ChargingError> {
        if self.opts.dry_run {
            return Ok(());
        }
        let ctx = self.ctx;
        for id in self.set.touched_ids() {
            if let Some(account) = self.set.get_mut(&id) {
                account.execute_action_triggers(None, &ctx);
            }
        }
        for account in self.set.touched_others() {
            debug!(peer = %account.id, "persisting shared group peer");
            ctx.storage.set_account(account)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> CallCost {
        let mut cc = std::mem::replace(&mut self.result, self.cd.create_call_cost());
        cc.cost = cc.timespans_cost();
        if cc.deduct_connect_fee && self.connect_fee_settled {
            cc.cost += cc.connect_fee;
        }
        cc
    }
}
