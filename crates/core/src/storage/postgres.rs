use crate::domain::news::TickerAggregate;
use crate::domain::recommendation::RecommendationSet;
use crate::storage::{lock, normalize_ticker, AggregateStore, StoredDocument};
use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use uuid::Uuid;

pub struct PgStore {
    pool: sqlx::PgPool,
    // Connection that holds the sweep advisory lock between acquire and release.
    lock_conn: tokio::sync::Mutex<Option<PoolConnection<Postgres>>>,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            lock_conn: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl AggregateStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn load_document(&self, ticker: &str) -> anyhow::Result<StoredDocument> {
        let ticker = normalize_ticker(ticker);
        let row: Option<(Value,)> =
            sqlx::query_as("SELECT document FROM ticker_aggregates WHERE ticker = $1")
                .persistent(false)
                .bind(&ticker)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("select ticker_aggregates failed (ticker={ticker})"))?;

        Ok(match row {
            None => StoredDocument::Missing,
            Some((doc,)) if doc.is_object() => StoredDocument::Present(doc),
            Some((doc,)) => StoredDocument::Corrupt {
                detail: format!("document is not a JSON object: {doc}"),
            },
        })
    }

    async fn save_aggregate(&self, aggregate: &TickerAggregate) -> anyhow::Result<()> {
        let ticker = normalize_ticker(&aggregate.ticker);
        let document = serde_json::to_value(aggregate).context("serialize aggregate failed")?;
        let total_news = i32::try_from(aggregate.total_news)
            .with_context(|| format!("total_news out of range for {ticker}"))?;

        sqlx::query(
            "INSERT INTO ticker_aggregates (ticker, total_news, weighted_average_sentiment, document, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (ticker) DO UPDATE \
               SET total_news = EXCLUDED.total_news, \
                   weighted_average_sentiment = EXCLUDED.weighted_average_sentiment, \
                   document = EXCLUDED.document, \
                   updated_at = EXCLUDED.updated_at",
        )
        .persistent(false)
        .bind(&ticker)
        .bind(total_news)
        .bind(aggregate.weighted_average_sentiment)
        .bind(document)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert ticker_aggregates failed (ticker={ticker})"))?;

        Ok(())
    }

    async fn load_recommendations(&self) -> anyhow::Result<Option<RecommendationSet>> {
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT document FROM recommendation_sets ORDER BY generated_at DESC LIMIT 1",
        )
        .persistent(false)
        .fetch_optional(&self.pool)
        .await
        .context("select recommendation_sets failed")?;

        row.map(|(doc,)| {
            serde_json::from_value::<RecommendationSet>(doc)
                .context("stored recommendation set has an unexpected shape")
        })
        .transpose()
    }

    /// Only the latest set is kept: the insert and the prune of older rows share a transaction.
    async fn save_recommendations(&self, set: &RecommendationSet) -> anyhow::Result<()> {
        let document = serde_json::to_value(set).context("serialize recommendations failed")?;
        let id = Uuid::new_v4();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin recommendation_sets tx failed")?;
        sqlx::query(
            "INSERT INTO recommendation_sets (id, generated_at, document) VALUES ($1, $2, $3)",
        )
        .persistent(false)
        .bind(id)
        .bind(Utc::now())
        .bind(document)
        .execute(&mut *tx)
        .await
        .context("insert recommendation_sets failed")?;
        sqlx::query("DELETE FROM recommendation_sets WHERE id <> $1")
            .persistent(false)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("prune recommendation_sets failed")?;
        tx.commit()
            .await
            .context("commit recommendation_sets tx failed")?;
        Ok(())
    }

    async fn try_acquire_sweep_lock(&self) -> anyhow::Result<bool> {
        let mut guard = self.lock_conn.lock().await;
        if guard.is_some() {
            return Ok(false);
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("acquire lock connection failed")?;
        let acquired = lock::try_acquire_sweep_lock(&mut conn).await?;
        if acquired {
            *guard = Some(conn);
        }
        Ok(acquired)
    }

    async fn release_sweep_lock(&self) -> anyhow::Result<()> {
        let Some(mut conn) = self.lock_conn.lock().await.take() else {
            return Ok(());
        };
        lock::release_sweep_lock(&mut conn).await
    }
}
