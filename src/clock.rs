//! Wall-clock helpers and the timestamp wire format.
//!
//! Timestamps are kept as milliseconds since the Unix epoch so ordering and
//! unread comparisons are plain integer comparisons. On the wire they are
//! written as RFC 3339 and read from RFC 3339, the SQLite
//! `YYYY-MM-DD HH:MM:SS` form (UTC), or raw epoch milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// Parse a textual timestamp into epoch milliseconds.
///
/// Offset-less forms are taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return to_ms(dt);
    }

    let naive_formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ];
    naive_formats
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(raw, fmt).ok())
        .and_then(|dt| to_ms(dt.assume_utc()))
}

/// Format epoch milliseconds as RFC 3339 (UTC).
#[must_use]
pub fn format_timestamp(ms: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

fn to_ms(dt: OffsetDateTime) -> Option<i64> {
    i64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok()
}

/// `#[serde(with = "crate::clock::timestamp")]` adapter for `i64` millis.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer, de};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(ms: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        match super::format_timestamp(*ms) {
            Some(text) => serializer.serialize_str(&text),
            None => serializer.serialize_i64(*ms),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Millis(ms) => Ok(ms),
            RawTimestamp::Text(text) => super::parse_timestamp(&text)
                .ok_or_else(|| de::Error::custom(format!("unrecognized timestamp: {text}"))),
        }
    }
}

#[cfg(test)]
#[path = "clock_test.rs"]
mod tests;
