//! Cost rounding with precise decimal arithmetic
//!
//! Balances and costs are held as `rust_decimal::Decimal` in memory and only
//! converted to 64-bit floats at the persistence boundary. Rounding is applied
//! to final call costs with an explicit method.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// How a cost is rounded to the configured number of decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoundingMethod {
    /// Always towards positive infinity
    #[serde(rename = "*up")]
    Up,
    /// Half away from zero
    #[default]
    #[serde(rename = "*middle")]
    Middle,
    /// Always towards negative infinity
    #[serde(rename = "*down")]
    Down,
}

impl RoundingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundingMethod::Up => "*up",
            RoundingMethod::Middle => "*middle",
            RoundingMethod::Down => "*down",
        }
    }

    fn strategy(&self) -> RoundingStrategy {
        match self {
            RoundingMethod::Up => RoundingStrategy::ToPositiveInfinity,
            RoundingMethod::Middle => RoundingStrategy::MidpointAwayFromZero,
            RoundingMethod::Down => RoundingStrategy::ToNegativeInfinity,
        }
    }
}

impl fmt::Display for RoundingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundingMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*up" => Ok(RoundingMethod::Up),
            "*middle" => Ok(RoundingMethod::Middle),
            "*down" => Ok(RoundingMethod::Down),
            other => Err(CoreError::validation(format!("unknown rounding method {}", other))),
        }
    }
}

/// Rounds `value` to `decimals` places using `method`
pub fn round(value: Decimal, decimals: u32, method: RoundingMethod) -> Decimal {
    value.round_dp_with_strategy(decimals, method.strategy())
}
