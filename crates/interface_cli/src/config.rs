//! Runner configuration

use core_kernel::RoundingMethod;
use domain_charging::ChargingConfig;
use serde::Deserialize;

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Runner configuration
///
/// Every field falls back to the engine default, so an empty environment is
/// a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// How long to wait for account and shared-group locks
    pub lock_timeout_ms: u64,
    /// Decimals kept on the final cost of a debit
    pub rounding_decimals: u32,
    /// `*up`, `*middle` or `*down`
    pub rounding_method: String,
    pub min_prefix_match: usize,
    pub max_call_duration_secs: i64,
    pub default_unit_rating_subject: String,
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = ChargingConfig::default();
        Self {
            lock_timeout_ms: engine.lock_timeout_ms,
            rounding_decimals: engine.rounding_decimals,
            rounding_method: engine.rounding_method.to_string(),
            min_prefix_match: engine.min_prefix_match,
            max_call_duration_secs: engine.max_call_duration_secs,
            default_unit_rating_subject: engine.default_unit_rating_subject,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Loads configuration from an optional file, then `CHARGER_*`
    /// environment variables
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix("CHARGER").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// The engine settings carried by this configuration
    pub fn charging(&self) -> Result<ChargingConfig, config::ConfigError> {
        let rounding_method = self
            .rounding_method
            .parse::<RoundingMethod>()
            .map_err(|e| config::ConfigError::Message(format!("rounding_method: {e}")))?;
        if self.max_call_duration_secs <= 0 {
            return Err(config::ConfigError::Message(
                "max_call_duration_secs must be positive".to_string(),
            ));
        }
        Ok(ChargingConfig {
            lock_timeout_ms: self.lock_timeout_ms,
            rounding_decimals: self.rounding_decimals,
            rounding_method,
            min_prefix_match: self.min_prefix_match,
            max_call_duration_secs: self.max_call_duration_secs,
            default_unit_rating_subject: self.default_unit_rating_subject.clone(),
        })
    }
}
