use crate::domain::news::NewsItem;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

/// Retained items of one ticker during a merge.
///
/// Built from the previously persisted aggregate, then grown with fresh items. Ids stay unique
/// and every dated item is at or after `cutoff`; previous items keep their order ahead of new ones.
#[derive(Debug, Clone)]
pub struct RetainedSet {
    ticker: String,
    cutoff: DateTime<Utc>,
    items: Vec<NewsItem>,
    ids: HashSet<String>,
    carried_over: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarryOverStats {
    pub kept: usize,
    pub expired: usize,
    pub undated_kept: usize,
    pub duplicates: usize,
    pub unrecognized: usize,
}

impl RetainedSet {
    pub fn empty(ticker: &str, cutoff: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.to_string(),
            cutoff,
            items: Vec::new(),
            ids: HashSet::new(),
            carried_over: 0,
        }
    }

    /// Keeps previous items at or after `cutoff`.
    ///
    /// Items whose date is missing or unparsable are kept regardless of age. Records without an
    /// `id` string and numeric `sentiment-score` are dropped.
    pub fn from_previous(
        ticker: &str,
        previous: Option<&Value>,
        cutoff: DateTime<Utc>,
    ) -> (Self, CarryOverStats) {
        let mut set = Self::empty(ticker, cutoff);
        let mut stats = CarryOverStats::default();

        let records = previous
            .and_then(|doc| doc.get("news"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for record in records {
            let item = match serde_json::from_value::<NewsItem>(record.clone()) {
                Ok(item) => item,
                Err(err) => {
                    stats.unrecognized += 1;
                    tracing::warn!(ticker, error = %err, %record, "dropping unrecognizable stored item");
                    continue;
                }
            };

            match item.published_at() {
                Some(published) if published.with_timezone(&Utc) < cutoff => {
                    stats.expired += 1;
                    continue;
                }
                Some(_) => {}
                None => {
                    stats.undated_kept += 1;
                    tracing::warn!(
                        ticker,
                        id = %item.id,
                        date = ?item.date,
                        "stored item has no valid date; retaining it"
                    );
                }
            }

            if !set.ids.insert(item.id.clone()) {
                stats.duplicates += 1;
                tracing::warn!(ticker, id = %item.id, "duplicate stored item id; keeping first");
                continue;
            }
            set.items.push(item);
            stats.kept += 1;
        }

        set.carried_over = set.items.len();
        (set, stats)
    }

    /// Whether a fresh item with this id and timestamp would be admitted. Lets callers skip
    /// scoring articles that will be rejected anyway.
    pub fn admits(&self, id: &str, published: DateTime<Utc>) -> bool {
        published >= self.cutoff && !self.ids.contains(id)
    }

    /// Appends a freshly scored item if it is inside the window and its id is new.
    pub fn admit(&mut self, item: NewsItem) -> bool {
        let Some(published) = item.published_at() else {
            tracing::warn!(ticker = %self.ticker, id = %item.id, "fresh item without a valid date; not admitted");
            return false;
        };
        if !self.admits(&item.id, published.with_timezone(&Utc)) {
            return false;
        }
        self.ids.insert(item.id.clone());
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn admitted(&self) -> usize {
        self.items.len() - self.carried_over
    }

    pub fn into_items(self) -> Vec<NewsItem> {
        self.items
    }
}

/// Reconciles a ticker's persisted aggregate with newly scored items.
pub fn merge_items(
    ticker: &str,
    previous: Option<&Value>,
    cutoff: DateTime<Utc>,
    fresh: Vec<NewsItem>,
) -> Vec<NewsItem> {
    let (mut set, _) = RetainedSet::from_previous(ticker, previous, cutoff);
    for item in fresh {
        set.admit(item);
    }
    set.into_items()
}
