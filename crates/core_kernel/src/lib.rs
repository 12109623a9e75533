//! Core Kernel - Foundational types and utilities for the charging engine
//!
//! This crate provides the fundamental building blocks used across the charging
//! crates:
//! - Strongly typed identifiers (balance uuids, `tenant:account` keys)
//! - Cost rounding with explicit rounding methods
//! - Time helpers shared by persisted records (nanosecond durations, expiry parsing)
//! - The port error type every collaborator adapter reports through

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{RoundingMethod, round};
pub use temporal::{parse_expiration, min_duration, round_up_to_increment};
pub use identifiers::{AccountKey, BalanceUuid, RequestId};
pub use ports::{PortError, DomainPort};
pub use error::CoreError;
