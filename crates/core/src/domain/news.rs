use crate::time::{parse_instant, us_market::age_in_days};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Number of daily buckets kept in an aggregate (index 0 = today).
pub const DAILY_BUCKETS: usize = 7;

/// One entry of the ticker universe (`stocklist.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerEntry {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
}

/// A scored news item as persisted in a ticker aggregate.
///
/// `date` is kept as raw JSON so that a record whose timestamp is not a parsable string (or not a
/// string at all) survives a rewrite unchanged. Only `id` and `sentiment-score` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_summary")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Value>,
    #[serde(rename = "sentiment-score")]
    pub sentiment_score: f64,
}

impl NewsItem {
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        self.date
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_instant)
    }

    /// Age relative to `today`, or `None` when the item carries no usable timestamp.
    pub fn age_in_days(&self, today: DateTime<Utc>) -> Option<i64> {
        self.published_at().map(|p| age_in_days(p, today))
    }
}

/// `null` reads as an empty summary; non-string values keep their JSON text.
fn lenient_summary<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// The persisted per-ticker state; rebuilt from scratch on every ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerAggregate {
    pub ticker: String,
    pub total_news: usize,
    pub average_sentiment: f64,
    pub weighted_average_sentiment: f64,
    pub average_daily_sentiments: [f64; DAILY_BUCKETS],
    pub news: Vec<NewsItem>,
}
