//! Timestamp utilities
//!
//! All times are persisted as INTEGER unix milliseconds so that range
//! comparisons (`start_time <= cutoff`) are numeric.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to the stored representation
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert a stored millisecond value back to a timestamp
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::Internal(format!("Timestamp out of range: {}", millis)))
}

/// Convert fractional unix seconds (trunk-recorder format) to a timestamp
pub fn from_unix_seconds(seconds: f64) -> Result<DateTime<Utc>> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::InvalidInput(format!("Invalid unix time: {}", seconds)));
    }
    from_millis((seconds * 1000.0).round() as i64)
}

/// Retention cutoff: everything at or before the returned instant is expired
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}
