//! Merge, weighting and ranking of per-ticker news sentiment.
//!
//! Everything here is a pure function of its inputs: callers pass the reference instants in, and
//! no state survives between invocations.

pub mod buckets;
pub mod builder;
pub mod decay;
pub mod merge;
pub mod ranking;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::news::NewsItem;
    use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
    use serde_json::Value;

    pub fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()
    }

    /// An item published at noon UTC `days_ago` days before `today()`.
    pub fn item(id: &str, days_ago: i64, score: f64) -> NewsItem {
        let at = today() + Duration::hours(12) - Duration::days(days_ago);
        NewsItem {
            id: id.to_string(),
            summary: format!("summary {id}"),
            date: Some(Value::String(at.to_rfc3339_opts(SecondsFormat::Secs, true))),
            sentiment_score: score,
        }
    }

    pub fn undated(id: &str, date: Option<&str>, score: f64) -> NewsItem {
        NewsItem {
            id: id.to_string(),
            summary: String::new(),
            date: date.map(|d| Value::String(d.to_string())),
            sentiment_score: score,
        }
    }
}
