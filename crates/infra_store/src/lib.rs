//! Infrastructure Store Layer
//!
//! In-memory implementations of the charging ports:
//!
//! - [`InMemoryStorage`]: accounts, shared groups, destinations and action
//!   sets behind `parking_lot` read/write locks, loadable from a JSON
//!   [`StoreSnapshot`]
//! - [`NamedLocker`]: an all-or-nothing named-resource guardian with timeouts
//! - [`FlatRateRater`]: a flat per-prefix rater
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_store::{FlatRateRater, InMemoryStorage, NamedLocker, RatePlan};
//! use rust_decimal_macros::dec;
//!
//! let storage = InMemoryStorage::from_json(&snapshot_json)?;
//! let rater = FlatRateRater::from_plans([RatePlan::per_minute("", dec!(1), 60)]);
//! let locker = NamedLocker::new();
//! ```

pub mod error;
pub mod locker;
pub mod rater;
pub mod storage;

pub use error::StoreError;
pub use locker::NamedLocker;
pub use rater::{FlatRateRater, RatePlan};
pub use storage::{InMemoryStorage, StoreSnapshot};
