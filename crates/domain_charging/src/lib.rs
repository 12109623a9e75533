//! Charging Domain - Prepaid/Postpaid Accounting Core
//!
//! This crate decides which balances of an account pay for a rated request,
//! debits them, and reacts to the resulting balance movements.
//!
//! # Concepts
//!
//! - **Balances**: typed value buckets (`*monetary`, `*voice`, `*data`, ...)
//!   restricted by destination, category and direction, ordered by weight
//! - **Shared groups**: pools that let a balance draw on the balances of
//!   every member account, ordered by a sharing strategy
//! - **Debit engine**: a unit phase then a money phase, repeated while any
//!   balance makes progress, with the remainder re-rated and optionally put
//!   on debt
//! - **Unit counters**: cumulative totals of consumption per filter
//! - **Action triggers**: thresholds on balances, counters or expiry that run
//!   action sets at most once until re-armed
//!
//! # Collaborators
//!
//! Storage, rating and locking are reached through the traits in [`ports`];
//! `infra_store` provides in-memory implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_charging::{CallDescriptor, ChargingConfig, Responder};
//!
//! let responder = Responder::new(storage, rater, guardian, ChargingConfig::default());
//! let cd = CallDescriptor::new("cgrates.org", "rif", "0723", start, end);
//! let cc = responder.debit(&cd)?;
//! println!("charged {}", cc.cost);
//! ```

pub mod account;
pub mod account_set;
pub mod action;
pub mod action_trigger;
pub mod balance;
pub mod balance_filter;
pub mod call;
pub mod config;
pub mod constants;
pub mod context;
pub mod debit;
pub mod destination;
pub mod error;
pub mod ports;
pub mod registry;
pub mod responder;
pub mod selector;
pub mod shared_group;
pub mod string_map;
pub mod unit_counter;

pub use account::Account;
pub use account_set::{AccountSet, BalanceRef};
pub use action::{sort_actions, Action, ActionHandler};
pub use action_trigger::{ActionTrigger, ThresholdMetric, ThresholdType};
pub use balance::Balance;
pub use balance_filter::BalanceFilter;
pub use call::{
    CallCost, CallDescriptor, DebitInfo, Increment, MaxCost, MaxCostStrategy, MonetaryInfo, TimeSpan, UnitInfo,
};
pub use config::ChargingConfig;
pub use context::ChargingContext;
pub use debit::{debit_credit_balance, ConnectFeeOutcome, DebitOptions};
pub use error::ChargingError;
pub use ports::{guard, AccountingStorage, Guardian, RatingPort};
pub use registry::{ActionRegistry, DEFAULT_ACTIONS};
pub use responder::Responder;
pub use selector::{collect_balances, select_balances, BalanceQuery, Candidate};
pub use shared_group::{SharedGroup, SharingParameters, SharingStrategy};
pub use string_map::StringMap;
pub use unit_counter::{CounterEvent, CounterFilter, CounterType, UnitCounter, UnitCounters};
