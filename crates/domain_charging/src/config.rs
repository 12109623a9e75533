//! Engine settings injected into the responder

use chrono::Duration;
use core_kernel::RoundingMethod;
use serde::{Deserialize, Serialize};

/// Tunables of the charging engine
///
/// Loaded by the binary from the environment; every field has a default so a
/// partially configured environment still yields a usable engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    /// How long to wait for account and shared-group locks
    pub lock_timeout_ms: u64,
    /// Decimals kept on the final cost of a debit
    pub rounding_decimals: u32,
    /// Rounding applied to the final cost of a debit
    pub rounding_method: RoundingMethod,
    /// Shortest destination prefix tried during reverse lookups
    pub min_prefix_match: usize,
    /// Longest usage a single request may describe
    pub max_call_duration_secs: i64,
    /// Rating subject assumed for unit balances that carry none
    pub default_unit_rating_subject: String,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            rounding_decimals: 10,
            rounding_method: RoundingMethod::Middle,
            min_prefix_match: 1,
            max_call_duration_secs: 3 * 3600,
            default_unit_rating_subject: "*zero1s".to_string(),
        }
    }
}

impl ChargingConfig {
    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn max_call_duration(&self) -> Duration {
        Duration::seconds(self.max_call_duration_secs)
    }
}
