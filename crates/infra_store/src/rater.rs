//! Flat-rate rating adapter
//!
//! Prices a request from a single rate per (subject, destination prefix),
//! the longest prefix winning and `*any` standing in for subjects without
//! plans of their own. Enough to drive the debit engine in tests and from
//! the command line; real tariff evaluation lives elsewhere.

use chrono::Duration;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use core_kernel::temporal::duration_nanos;
use core_kernel::{round_up_to_increment, DomainPort, PortError};
use domain_charging::constants::META_ANY;
use domain_charging::{CallCost, CallDescriptor, Increment, MaxCost, RatingPort, TimeSpan};

/// Price of usage towards one destination prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RatePlan {
    /// Subject the plan applies to, `*any` for every subject
    #[serde(default = "any_subject")]
    pub subject: String,
    /// Destination prefix, empty matches every destination
    #[serde(default)]
    pub prefix: String,
    #[serde(with = "rust_decimal::serde::float", default)]
    pub connect_fee: Decimal,
    /// Price of one `rate_unit`
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    #[serde(with = "duration_nanos")]
    pub rate_unit: Duration,
    /// Billing granularity
    #[serde(with = "duration_nanos")]
    pub rate_increment: Duration,
    #[serde(default)]
    pub max_cost: Option<MaxCost>,
}

fn any_subject() -> String {
    META_ANY.to_string()
}

impl RatePlan {
    /// A plan for every subject charging `rate` per minute in
    /// `increment_secs` steps
    pub fn per_minute(prefix: impl Into<String>, rate: Decimal, increment_secs: i64) -> Self {
        Self {
            subject: any_subject(),
            prefix: prefix.into(),
            connect_fee: Decimal::ZERO,
            rate,
            rate_unit: Duration::minutes(1),
            rate_increment: Duration::seconds(increment_secs),
            max_cost: None,
        }
    }

    pub fn for_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_connect_fee(mut self, connect_fee: Decimal) -> Self {
        self.connect_fee = connect_fee;
        self
    }

    pub fn with_max_cost(mut self, max_cost: MaxCost) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    fn increment_cost(&self) -> Decimal {
        match (self.rate_increment.num_nanoseconds(), self.rate_unit.num_nanoseconds()) {
            (Some(increment), Some(unit)) if unit > 0 => self.rate * Decimal::from(increment) / Decimal::from(unit),
            _ => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct FlatRateRater {
    plans: RwLock<BTreeMap<String, Vec<RatePlan>>>,
}

impl FlatRateRater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_plans(plans: impl IntoIterator<Item = RatePlan>) -> Self {
        let rater = Self::new();
        for plan in plans {
            rater.add_plan(plan);
        }
        rater
    }

    /// Adds a plan, replacing one with the same subject and prefix
    pub fn add_plan(&self, plan: RatePlan) {
        let mut plans = self.plans.write();
        let subject_plans = plans.entry(plan.subject.clone()).or_default();
        subject_plans.retain(|p| p.prefix != plan.prefix);
        subject_plans.push(plan);
    }

    /// The plan that prices `destination` for `subject`
    pub fn plan_for(&self, subject: &str, destination: &str) -> Option<RatePlan> {
        let plans = self.plans.read();
        [subject, META_ANY].iter().find_map(|key| {
            plans
                .get(*key)?
                .iter()
                .filter(|p| destination.starts_with(&p.prefix))
                .max_by_key(|p| p.prefix.len())
                .cloned()
        })
    }
}

impl DomainPort for FlatRateRater {}

impl RatingPort for FlatRateRater {
    fn get_cost(&self, cd: &CallDescriptor) -> Result<CallCost, PortError> {
        let plan = self
            .plan_for(&cd.subject, &cd.destination)
            .ok_or_else(|| PortError::not_found("RatingPlan", format!("{}:{}", cd.subject, cd.destination)))?;
        if plan.rate_increment <= Duration::zero() {
            return Err(PortError::validation_field("rate increment must be positive", "RateIncrement"));
        }

        let mut cc = cd.create_call_cost();
        let mut ts = TimeSpan::new(cd.time_start, cd.time_end);
        ts.duration_index = cd.duration_index;
        ts.max_cost = plan.max_cost;
        let covered = round_up_to_increment(ts.duration(), plan.rate_increment);
        ts.time_end = ts.time_start + covered;
        let count = match (covered.num_nanoseconds(), plan.rate_increment.num_nanoseconds()) {
            (Some(total), Some(step)) => total / step,
            _ => 0,
        };
        let cost = plan.increment_cost();
        ts.increments = (0..count).map(|_| Increment::new(plan.rate_increment, cost)).collect();
        cc.timespans.push(ts);

        cc.connect_fee = plan.connect_fee;
        cc.cost = cc.timespans_cost();
        if cc.deduct_connect_fee {
            cc.cost += cc.connect_fee;
        }
        debug!(subject = %cd.subject, prefix = %plan.prefix, cost = %cc.cost, "rated");
        Ok(cc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn call(destination: &str, secs: i64) -> CallDescriptor {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        CallDescriptor::new("cgrates.org", "rif", destination, start, start + Duration::seconds(secs))
    }

    #[test]
    fn test_longest_prefix_wins() {
        let rater = FlatRateRater::from_plans([
            RatePlan::per_minute("", dec!(1), 60),
            RatePlan::per_minute("0723", dec!(0.6), 1),
        ]);
        assert_eq!(rater.plan_for("rif", "0723045").unwrap().prefix, "0723");
        assert_eq!(rater.plan_for("rif", "0999").unwrap().prefix, "");
    }

    #[test]
    fn test_subject_plan_before_any() {
        let rater = FlatRateRater::from_plans([
            RatePlan::per_minute("", dec!(1), 60),
            RatePlan::per_minute("", dec!(0), 60).for_subject("FREE"),
        ]);
        assert_eq!(rater.plan_for("FREE", "0723").unwrap().rate, dec!(0));
        assert_eq!(rater.plan_for("rif", "0723").unwrap().rate, dec!(1));
    }

    #[test]
    fn test_rounds_up_to_increment_and_adds_connect_fee() {
        let rater = FlatRateRater::from_plans([RatePlan::per_minute("", dec!(1.2), 60).with_connect_fee(dec!(0.5))]);
        let cc = rater.get_cost(&call("0723", 61)).unwrap();
        assert_eq!(cc.timespans[0].increments.len(), 2);
        assert_eq!(cc.duration(), Duration::seconds(120));
        assert_eq!(cc.cost, dec!(2.9));
    }

    #[test]
    fn test_connect_fee_only_on_first_loop() {
        let rater = FlatRateRater::from_plans([RatePlan::per_minute("", dec!(1), 60).with_connect_fee(dec!(0.5))]);
        let mut cd = call("0723", 60);
        cd.loop_index = 1;
        let cc = rater.get_cost(&cd).unwrap();
        assert_eq!(cc.cost, dec!(1));
        assert_eq!(cc.connect_fee, dec!(0.5));
    }

    #[test]
    fn test_unknown_destination_without_catch_all() {
        let rater = FlatRateRater::from_plans([RatePlan::per_minute("0723", dec!(1), 60)]);
        assert!(rater.get_cost(&call("0999", 60)).unwrap_err().is_not_found());
    }
}
