//! Published-date normalization.
//!
//! Feeds publish dates in whatever format their generator likes. Everything
//! stored goes through [`normalize_date`], which keeps the wall-clock time as
//! written (no timezone conversion) so the calendar date a reader saw in the
//! feed is the one used for filtering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Canonical stored format.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What unparseable dates become.
pub const EPOCH: &str = "1970-01-01 00:00:00";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a feed date into its naive wall-clock time.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Normalize a feed date to `YYYY-MM-DD HH:MM:SS`; unparseable input
/// becomes the epoch start.
pub fn normalize_date(raw: &str) -> String {
    match parse_date(raw) {
        Some(dt) => dt.format(CANONICAL_FORMAT).to_string(),
        None => {
            tracing::debug!(raw, "Unparseable feed date, using epoch");
            EPOCH.to_string()
        }
    }
}

/// Calendar date (`YYYY-MM-DD`) of a date filter, or `None` if it can't be parsed.
pub fn filter_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|dt| dt.date().format("%Y-%m-%d").to_string())
}
