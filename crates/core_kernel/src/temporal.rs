//! Time helpers shared by charging records
//!
//! - Durations persist as integer nanoseconds
//! - Expiry expressions on actions resolve to an optional instant
//! - Usage is rounded up to whole rating increments

use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;

/// Keyword for a balance or trigger that never expires
pub const UNLIMITED: &str = "*unlimited";

/// Serde adapter persisting a `chrono::Duration` as integer nanoseconds
pub mod duration_nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value.num_nanoseconds() {
            Some(nanos) => serializer.serialize_i64(nanos),
            None => Err(serde::ser::Error::custom("duration overflows i64 nanoseconds")),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::nanoseconds(nanos))
    }
}

/// Resolves an expiry expression relative to `now`
///
/// Accepted forms: empty or `*unlimited` (never expires), an RFC 3339
/// instant, or a relative offset `+<n><unit>` with unit `s`, `m`, `h` or `d`.
pub fn parse_expiration(expr: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CoreError> {
    let expr = expr.trim();
    if expr.is_empty() || expr == UNLIMITED {
        return Ok(None);
    }
    if let Some(offset) = expr.strip_prefix('+') {
        return Ok(Some(now + parse_offset(offset)?));
    }
    DateTime::parse_from_rfc3339(expr)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| CoreError::invalid_time(format!("{}: {}", expr, e)))
}

fn parse_offset(offset: &str) -> Result<Duration, CoreError> {
    let split = offset.len().saturating_sub(1);
    let (amount, unit) = offset.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| CoreError::invalid_time(format!("bad offset amount in +{}", offset)))?;
    match unit {
        "s" => Ok(Duration::seconds(amount)),
        "m" => Ok(Duration::minutes(amount)),
        "h" => Ok(Duration::hours(amount)),
        "d" => Ok(Duration::days(amount)),
        _ => Err(CoreError::invalid_time(format!("bad offset unit in +{}", offset))),
    }
}

/// Returns the shorter of two durations
pub fn min_duration(a: Duration, b: Duration) -> Duration {
    if a < b { a } else { b }
}

/// Rounds `value` up to the next whole multiple of `increment`
pub fn round_up_to_increment(value: Duration, increment: Duration) -> Duration {
    let (Some(v), Some(inc)) = (value.num_nanoseconds(), increment.num_nanoseconds()) else {
        return value;
    };
    if inc <= 0 || v % inc == 0 {
        return value;
    }
    Duration::nanoseconds((v / inc + 1) * inc)
}
