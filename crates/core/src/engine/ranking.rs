use crate::domain::recommendation::{RankedTicker, RecommendationSet};
use std::cmp::Ordering;

pub const TOP_N: usize = 5;

/// Sorts descending by weighted average (stable: equal scores keep universe order) and takes the
/// first and last `TOP_N` entries of that one list.
///
/// With fewer than `2 * TOP_N` tickers the two lists overlap; that is kept as observable
/// behavior. The worst list stays in descending order.
pub fn rank(mut entries: Vec<RankedTicker>) -> RecommendationSet {
    entries.sort_by(|a, b| {
        b.weighted_average
            .partial_cmp(&a.weighted_average)
            .unwrap_or(Ordering::Equal)
    });

    let top_5_best = entries.iter().take(TOP_N).cloned().collect();
    let top_5_worst = entries[entries.len().saturating_sub(TOP_N)..].to_vec();

    RecommendationSet {
        top_5_best,
        top_5_worst,
    }
}
