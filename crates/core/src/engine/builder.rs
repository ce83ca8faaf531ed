use crate::domain::news::{NewsItem, TickerAggregate};
use crate::engine::buckets::daily_sentiments;
use crate::engine::decay::decay_weight;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Items left out of the weighted average and the histogram for lack of a valid date.
    pub undated: usize,
    /// Dated items that carried weight (age 0..=6).
    pub in_window: usize,
}

/// Unweighted mean over every item; 0 for an empty list.
pub fn average_sentiment(items: &[NewsItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|i| i.sentiment_score).sum::<f64>() / items.len() as f64
}

/// `Σ(score · weight) / Σ(weight)` over dated items; 0 when no item carries weight.
pub fn weighted_average_sentiment(items: &[NewsItem], today: DateTime<Utc>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for item in items {
        let Some(age) = item.age_in_days(today) else {
            continue;
        };
        let weight = decay_weight(age);
        weighted_sum += item.sentiment_score * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        0.0
    } else {
        weighted_sum / total_weight
    }
}

pub fn build_aggregate(
    ticker: &str,
    items: Vec<NewsItem>,
    today: DateTime<Utc>,
) -> (TickerAggregate, BuildReport) {
    let mut report = BuildReport::default();
    for item in &items {
        match item.age_in_days(today) {
            None => {
                report.undated += 1;
                tracing::warn!(
                    ticker,
                    id = %item.id,
                    date = ?item.date,
                    "invalid item date; excluded from weighted average and daily buckets"
                );
            }
            Some(age) if decay_weight(age) > 0.0 => report.in_window += 1,
            Some(_) => {}
        }
    }

    let aggregate = TickerAggregate {
        ticker: ticker.to_string(),
        total_news: items.len(),
        average_sentiment: average_sentiment(&items),
        weighted_average_sentiment: weighted_average_sentiment(&items, today),
        average_daily_sentiments: daily_sentiments(&items, today),
        news: items,
    };

    (aggregate, report)
}
