//! Canonical timestamp text
//!
//! All timestamps in the store and the catalog are RFC 3339 UTC with
//! microsecond precision and a `Z` suffix, e.g. `2026-10-18T09:30:00.123456Z`.
//! The fixed width makes lexicographic order equal chronological order, which
//! the incremental diff relies on when comparing in SQL.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time truncated to the stored precision.
///
/// Truncating up front means a value read back from text compares equal to
/// the value that was written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp in canonical form.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.trunc_subsecs(6).to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses any RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
