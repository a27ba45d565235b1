//! Timestamp encoding for SQLite text columns
//!
//! Timestamps are stored as RFC 3339 in UTC with microsecond precision and a
//! `Z` suffix. The encoding is fixed-width, so lexicographic order in SQL
//! matches chronological order and range predicates work on plain TEXT.

use chrono::{DateTime, SecondsFormat, Utc};

/// Encode a timestamp for storage
pub fn encode(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp
pub fn decode(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// Current time truncated to the stored precision, so values read back
/// compare equal to the ones written.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    decode(&encode(&now)).unwrap_or(now)
}
