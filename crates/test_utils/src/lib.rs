//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! charging test suite.
//!
//! # Modules
//!
//! - `fixtures`: Fixed instants and an in-memory charging world
//! - `builders`: Builder patterns for accounts, balances, triggers and calls
//! - `assertions`: Custom assertion helpers for balances and call costs
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
