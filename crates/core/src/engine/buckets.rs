use crate::domain::news::{NewsItem, DAILY_BUCKETS};
use chrono::{DateTime, Utc};

/// Mean score per age-in-days bucket (index 0 = today). Empty buckets, and items that are
/// undated or outside 0..=6 days, contribute nothing.
pub fn daily_sentiments(items: &[NewsItem], today: DateTime<Utc>) -> [f64; DAILY_BUCKETS] {
    let mut sums = [0.0_f64; DAILY_BUCKETS];
    let mut counts = [0_usize; DAILY_BUCKETS];

    for item in items {
        let Some(age) = item.age_in_days(today) else {
            continue;
        };
        let Ok(idx) = usize::try_from(age) else {
            continue;
        };
        if idx < DAILY_BUCKETS {
            sums[idx] += item.sentiment_score;
            counts[idx] += 1;
        }
    }

    let mut out = [0.0_f64; DAILY_BUCKETS];
    for (idx, slot) in out.iter_mut().enumerate() {
        if counts[idx] > 0 {
            *slot = sums[idx] / counts[idx] as f64;
        }
    }
    out
}
