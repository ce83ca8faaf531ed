pub mod us_market;

use chrono::{DateTime, FixedOffset};

/// Parses a persisted or fetched item timestamp ('Z' or numeric offset suffix).
pub fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim()).ok()
}
