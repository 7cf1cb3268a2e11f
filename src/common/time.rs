//! Simple time helpers used by multiple services.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Current wall-clock instant in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Compact, lexicographically sortable stamp used in file names
/// (`20261019T101500123Z`).
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// Inverse of [`file_stamp`]; `None` for anything that is not a stamp.
pub fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S%3fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Instant `days` before `at`.
pub fn days_before(at: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    at - Duration::days(i64::from(days))
}
