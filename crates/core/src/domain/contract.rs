use crate::domain::news::NewsItem;
use crate::ingest::types::RawArticle;
use crate::time::parse_instant;
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;

/// A fetched article that passed boundary validation but has not been scored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: String,
    /// Timestamp string exactly as the source sent it; persisted verbatim.
    pub date: String,
    pub published_at: DateTime<FixedOffset>,
    pub summary: String,
}

impl Article {
    pub fn published_utc(&self) -> DateTime<Utc> {
        self.published_at.with_timezone(&Utc)
    }

    pub fn into_news_item(self, sentiment_score: f64) -> NewsItem {
        NewsItem {
            id: self.id,
            summary: self.summary,
            date: Some(serde_json::Value::String(self.date)),
            sentiment_score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleRejected {
    pub id: Option<String>,
    pub reason: &'static str,
    pub detail: String,
}

impl fmt::Display for ArticleRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "article rejected (id={}, reason={}): {}",
            self.id.as_deref().unwrap_or("<none>"),
            self.reason,
            self.detail
        )
    }
}

impl std::error::Error for ArticleRejected {}

impl RawArticle {
    pub fn validate_and_into_article(self) -> Result<Article, ArticleRejected> {
        // Ids are opaque: kept verbatim, only blank ones are rejected.
        let id = self.id.filter(|s| !s.trim().is_empty());
        let Some(id) = id else {
            return Err(ArticleRejected {
                id: None,
                reason: "missing_id",
                detail: "id must be a non-empty string".to_string(),
            });
        };

        let Some(content) = self.content else {
            return Err(ArticleRejected {
                id: Some(id),
                reason: "missing_content",
                detail: "content object is absent".to_string(),
            });
        };

        let Some(date) = content.pub_date else {
            return Err(ArticleRejected {
                id: Some(id),
                reason: "missing_pub_date",
                detail: "content.pubDate is absent".to_string(),
            });
        };
        let Some(published_at) = parse_instant(&date) else {
            return Err(ArticleRejected {
                id: Some(id),
                reason: "invalid_pub_date",
                detail: format!("content.pubDate is not an ISO-8601 instant: {date:?}"),
            });
        };

        let Some(summary) = content.summary else {
            return Err(ArticleRejected {
                id: Some(id),
                reason: "missing_summary",
                detail: "content.summary is absent".to_string(),
            });
        };

        Ok(Article {
            id,
            date,
            published_at,
            summary,
        })
    }
}
