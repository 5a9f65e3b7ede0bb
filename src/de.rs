//! Deserialisation helpers for venue payloads that string-encode numerics
//! and use epoch-millisecond timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, de};

/// Deserialise a `String` into any type that implements `FromStr`.
///
/// Exchange feeds deliver prices and volumes as strings; parse failures are
/// surfaced as local deserialisation errors and never escalate past the frame.
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

/// Deserialise an epoch-milliseconds integer into a `DateTime<Utc>`.
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = i64::deserialize(deserializer)?;
    DateTime::from_timestamp_millis(epoch_ms)
        .ok_or_else(|| de::Error::custom(format!("invalid epoch milliseconds: {epoch_ms}")))
}
