//! Calendar-day and due-timestamp conversions.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Calendar-day format stored on items and history entries.
pub const DAY_FORMAT: &str = "%m/%d/%Y";

/// Parse a stored `MM/DD/YYYY` day.
#[must_use]
pub fn parse_day(day: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(day.trim(), DAY_FORMAT).ok()
}

/// Format unix seconds as a `MM/DD/YYYY` day (UTC).
#[must_use]
pub fn format_day(unix_seconds: f64) -> Option<String> {
    timestamp(unix_seconds).map(|at| at.format(DAY_FORMAT).to_string())
}

/// ISO-8601 due timestamp for the ticketing API.
///
/// The calendar day wins when it parses; the card is then due at the last
/// second of that day. Otherwise the unix timestamp is used as-is.
#[must_use]
pub fn due_timestamp(day: Option<&str>, unix_seconds: Option<f64>) -> Option<String> {
    if let Some(end_of_day) = day
        .and_then(parse_day)
        .and_then(|date| date.and_hms_opt(23, 59, 59))
    {
        return Some(
            end_of_day
                .and_utc()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    unix_seconds
        .and_then(timestamp)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp(unix_seconds: f64) -> Option<DateTime<Utc>> {
    if !unix_seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp(unix_seconds.trunc() as i64, 0)
}
