pub mod files;
pub mod lock;
pub mod postgres;

use crate::config::{Settings, StorageBackend};
use crate::domain::news::TickerAggregate;
use crate::domain::recommendation::RecommendationSet;
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

/// A ticker's persisted aggregate as read back, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    Missing,
    Corrupt { detail: String },
    Present(Value),
}

impl StoredDocument {
    pub fn weighted_average(&self) -> Option<f64> {
        match self {
            StoredDocument::Present(doc) => doc.get("weighted_average_sentiment")?.as_f64(),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
pub trait AggregateStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn load_document(&self, ticker: &str) -> anyhow::Result<StoredDocument>;

    async fn save_aggregate(&self, aggregate: &TickerAggregate) -> anyhow::Result<()>;

    async fn load_recommendations(&self) -> anyhow::Result<Option<RecommendationSet>>;

    async fn save_recommendations(&self, set: &RecommendationSet) -> anyhow::Result<()>;

    /// Guards a whole sweep. `false` means another sweep holds it.
    async fn try_acquire_sweep_lock(&self) -> anyhow::Result<bool>;

    async fn release_sweep_lock(&self) -> anyhow::Result<()>;
}

pub async fn open(settings: &Settings) -> anyhow::Result<Arc<dyn AggregateStore>> {
    match settings.storage_backend {
        StorageBackend::Files => Ok(Arc::new(files::FileStore::new(&settings.data_dir))),
        StorageBackend::Postgres => {
            let db_url = settings.require_database_url()?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            migrate(&pool).await?;
            Ok(Arc::new(postgres::PgStore::new(pool)))
        }
    }
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Canonical key for a ticker symbol: trimmed and uppercase.
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

const MAX_TICKER_LEN: usize = 16;

/// Symbols are ASCII alphanumerics plus `.` and `-` (`BRK.B`, `RDS-A`), starting with an
/// alphanumeric. Anything else never reaches a storage key or a file name.
pub fn is_valid_ticker(ticker: &str) -> bool {
    let ticker = ticker.trim();
    ticker.len() <= MAX_TICKER_LEN
        && ticker
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric())
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weighted_average_only_from_present_documents() {
        let doc = StoredDocument::Present(json!({"weighted_average_sentiment": 0.25}));
        assert_eq!(doc.weighted_average(), Some(0.25));
        assert_eq!(StoredDocument::Present(json!({})).weighted_average(), None);
        assert_eq!(StoredDocument::Missing.weighted_average(), None);
        let corrupt = StoredDocument::Corrupt {
            detail: "eof".to_string(),
        };
        assert_eq!(corrupt.weighted_average(), None);
    }

    #[test]
    fn normalizes_tickers() {
        assert_eq!(normalize_ticker(" aapl "), "AAPL");
    }

    #[test]
    fn validates_ticker_symbols() {
        for ok in ["AAPL", "brk.b", "RDS-A", " MSFT "] {
            assert!(is_valid_ticker(ok), "{ok}");
        }
        for bad in ["", "../../x", "..", ".hidden", "a/b", "a b", "AAPL\\x", "ABCDEFGHIJKLMNOPQ"] {
            assert!(!is_valid_ticker(bad), "{bad}");
        }
    }
}
