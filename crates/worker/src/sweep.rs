use chrono::{DateTime, Utc};
use magnifier_core::domain::news::TickerEntry;
use magnifier_core::domain::recommendation::{RankedTicker, RecommendationSet};
use magnifier_core::engine::builder::build_aggregate;
use magnifier_core::engine::merge::RetainedSet;
use magnifier_core::engine::ranking::rank;
use magnifier_core::ingest::provider::NewsSource;
use magnifier_core::scorer::SentimentScorer;
use magnifier_core::storage::{AggregateStore, StoredDocument};
use magnifier_core::time::us_market::ReferenceClock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub retention_days: i64,
    /// Upper bound on tickers in flight at once (the scorer's capacity).
    pub concurrency: usize,
    /// Compute everything, persist nothing.
    pub dry_run: bool,
}

#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn AggregateStore>,
    pub source: Arc<dyn NewsSource>,
    pub scorer: Arc<dyn SentimentScorer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerOutcome {
    pub ticker: String,
    pub carried_over: usize,
    pub fetched: usize,
    pub rejected: usize,
    pub admitted: usize,
    pub total_news: usize,
    pub weighted_average: f64,
}

#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub run_id: Uuid,
    pub succeeded: Vec<TickerOutcome>,
    pub failed: Vec<String>,
    pub recommendations: RecommendationSet,
}

/// Load, merge, score, aggregate and persist one ticker. On error nothing is written, so the
/// previous aggregate stays in place.
pub async fn ingest_ticker(
    ticker: &str,
    clock: &ReferenceClock,
    collab: &Collaborators,
    dry_run: bool,
) -> anyhow::Result<TickerOutcome> {
    let previous = match collab.store.load_document(ticker).await? {
        StoredDocument::Present(doc) => Some(doc),
        StoredDocument::Missing => None,
        StoredDocument::Corrupt { detail } => {
            tracing::warn!(ticker, %detail, "stored aggregate is corrupt; starting from empty");
            None
        }
    };

    let (mut retained, carry) = RetainedSet::from_previous(ticker, previous.as_ref(), clock.cutoff);
    tracing::debug!(
        ticker,
        kept = carry.kept,
        expired = carry.expired,
        undated_kept = carry.undated_kept,
        unrecognized = carry.unrecognized,
        "previous items reconciled"
    );

    let raw_articles = collab.source.fetch_news(ticker).await?;
    let fetched = raw_articles.len();
    let mut rejected: usize = 0;

    for raw in raw_articles {
        let article = match raw.validate_and_into_article() {
            Ok(article) => article,
            Err(err) => {
                rejected += 1;
                tracing::warn!(ticker, error = %err, "skipping invalid news record");
                continue;
            }
        };

        if !retained.admits(&article.id, article.published_utc()) {
            continue;
        }

        let score = collab.scorer.score(&article.summary).await?;
        retained.admit(article.into_news_item(score));
    }

    let carried_over = carry.kept;
    let admitted = retained.admitted();
    let (aggregate, report) = build_aggregate(ticker, retained.into_items(), clock.today);

    if !dry_run {
        collab.store.save_aggregate(&aggregate).await?;
    }

    tracing::info!(
        ticker,
        new_items = admitted,
        total_news = aggregate.total_news,
        undated = report.undated,
        weighted_average = aggregate.weighted_average_sentiment,
        dry_run,
        "ticker aggregate rebuilt"
    );

    Ok(TickerOutcome {
        ticker: ticker.to_string(),
        carried_over,
        fetched,
        rejected,
        admitted,
        total_news: aggregate.total_news,
        weighted_average: aggregate.weighted_average_sentiment,
    })
}

/// Reads every ticker's persisted weighted average. Tickers without a readable aggregate are left
/// out rather than scored as zero.
pub async fn collect_weighted_averages(
    universe: &[TickerEntry],
    store: &dyn AggregateStore,
) -> Vec<RankedTicker> {
    let mut out = Vec::with_capacity(universe.len());
    for entry in universe {
        let ticker = entry.ticker.as_str();
        match store.load_document(ticker).await {
            Ok(doc) => match doc.weighted_average() {
                Some(weighted_average) => out.push(RankedTicker {
                    ticker: ticker.to_string(),
                    weighted_average,
                }),
                None => {
                    tracing::warn!(ticker, ?doc, "no readable aggregate; excluded from ranking");
                }
            },
            Err(err) => {
                tracing::warn!(ticker, error = %err, "failed to read aggregate; excluded from ranking");
            }
        }
    }
    out
}

/// One full cycle: ingest every ticker, then rank once all of them are done.
///
/// Returns `Ok(None)` when another sweep holds the lock.
pub async fn run_sweep(
    universe: &[TickerEntry],
    collab: &Collaborators,
    opts: &SweepOptions,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<Option<SweepSummary>> {
    if !opts.dry_run && !collab.store.try_acquire_sweep_lock().await? {
        tracing::warn!("sweep lock not acquired; another sweep in progress");
        return Ok(None);
    }

    let res = run_locked(universe, collab, opts, now_utc).await;

    if !opts.dry_run {
        if let Err(err) = collab.store.release_sweep_lock().await {
            tracing::error!(error = %err, "failed to release sweep lock");
        }
    }

    res.map(Some)
}

async fn run_locked(
    universe: &[TickerEntry],
    collab: &Collaborators,
    opts: &SweepOptions,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<SweepSummary> {
    let run_id = Uuid::new_v4();
    let clock = ReferenceClock::resolve(now_utc, opts.retention_days)?;
    tracing::info!(
        %run_id,
        tickers = universe.len(),
        cutoff = %clock.cutoff,
        now_market = %clock.now_market,
        store = collab.store.backend_name(),
        source = collab.source.source_name(),
        scorer = collab.scorer.scorer_name(),
        "sweep started"
    );

    let limiter = Arc::new(tokio::sync::Semaphore::new(opts.concurrency.max(1)));
    let mut tasks = tokio::task::JoinSet::new();
    for entry in universe {
        let ticker = entry.ticker.clone();
        let collab = collab.clone();
        let limiter = Arc::clone(&limiter);
        let dry_run = opts.dry_run;
        tasks.spawn(async move {
            let res = match limiter.acquire_owned().await {
                Ok(_permit) => ingest_ticker(&ticker, &clock, &collab, dry_run).await,
                Err(err) => Err(anyhow::Error::new(err)),
            };
            (ticker, res)
        });
    }

    let mut outcomes: HashMap<String, TickerOutcome> = HashMap::new();
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(outcome))) => {
                outcomes.insert(outcome.ticker.clone(), outcome);
            }
            Ok((ticker, Err(err))) => {
                sentry_anyhow::capture_anyhow(&err);
                let detail = format!("{err:#}");
                tracing::error!(%run_id, %ticker, error = %detail, "ticker ingestion failed; aggregate left untouched");
                failed.push(ticker);
            }
            Err(join_err) => {
                let err = anyhow::Error::new(join_err);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%run_id, error = %err, "ticker task aborted");
            }
        }
    }

    // Ranking only starts after every ticker task above has finished.
    let ranked = if opts.dry_run {
        universe
            .iter()
            .filter_map(|e| outcomes.get(&e.ticker))
            .map(|o| RankedTicker {
                ticker: o.ticker.clone(),
                weighted_average: o.weighted_average,
            })
            .collect()
    } else {
        collect_weighted_averages(universe, collab.store.as_ref()).await
    };
    let ranked_len = ranked.len();
    let recommendations = rank(ranked);

    if !opts.dry_run {
        collab.store.save_recommendations(&recommendations).await?;
    }

    let succeeded: Vec<TickerOutcome> = universe
        .iter()
        .filter_map(|e| outcomes.remove(&e.ticker))
        .collect();

    tracing::info!(
        %run_id,
        succeeded = succeeded.len(),
        failed = failed.len(),
        ranked = ranked_len,
        dry_run = opts.dry_run,
        "sweep finished"
    );

    Ok(SweepSummary {
        run_id,
        succeeded,
        failed,
        recommendations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SecondsFormat, TimeZone};
    use magnifier_core::domain::news::TickerAggregate;
    use magnifier_core::ingest::types::{RawArticle, RawArticleContent};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        docs: Mutex<HashMap<String, StoredDocument>>,
        recs: Mutex<Option<RecommendationSet>>,
        locked: Mutex<bool>,
    }

    impl MemoryStore {
        fn put(&self, ticker: &str, doc: StoredDocument) {
            self.docs.lock().unwrap().insert(ticker.to_string(), doc);
        }

        fn doc(&self, ticker: &str) -> Option<Value> {
            match self.docs.lock().unwrap().get(ticker) {
                Some(StoredDocument::Present(v)) => Some(v.clone()),
                _ => None,
            }
        }
    }

    #[async_trait::async_trait]
    impl AggregateStore for MemoryStore {
        fn backend_name(&self) -> &'static str {
            "memory"
        }

        async fn load_document(&self, ticker: &str) -> anyhow::Result<StoredDocument> {
            Ok(self
                .docs
                .lock()
                .unwrap()
                .get(ticker)
                .cloned()
                .unwrap_or(StoredDocument::Missing))
        }

        async fn save_aggregate(&self, aggregate: &TickerAggregate) -> anyhow::Result<()> {
            self.put(
                &aggregate.ticker,
                StoredDocument::Present(serde_json::to_value(aggregate)?),
            );
            Ok(())
        }

        async fn load_recommendations(&self) -> anyhow::Result<Option<RecommendationSet>> {
            Ok(self.recs.lock().unwrap().clone())
        }

        async fn save_recommendations(&self, set: &RecommendationSet) -> anyhow::Result<()> {
            *self.recs.lock().unwrap() = Some(set.clone());
            Ok(())
        }

        async fn try_acquire_sweep_lock(&self) -> anyhow::Result<bool> {
            let mut locked = self.locked.lock().unwrap();
            if *locked {
                return Ok(false);
            }
            *locked = true;
            Ok(true)
        }

        async fn release_sweep_lock(&self) -> anyhow::Result<()> {
            *self.locked.lock().unwrap() = false;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSource {
        news: HashMap<String, Vec<RawArticle>>,
        failing: Vec<String>,
    }

    #[async_trait::async_trait]
    impl NewsSource for FakeSource {
        fn source_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_news(&self, ticker: &str) -> anyhow::Result<Vec<RawArticle>> {
            if self.failing.iter().any(|t| t == ticker) {
                anyhow::bail!("upstream unavailable for {ticker}");
            }
            Ok(self.news.get(ticker).cloned().unwrap_or_default())
        }
    }

    /// Scores "good ..." as 0.8, "bad ..." as -0.6, everything else 0.
    #[derive(Default)]
    struct KeywordScorer {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SentimentScorer for KeywordScorer {
        fn scorer_name(&self) -> &'static str {
            "keyword"
        }

        async fn score(&self, text: &str) -> anyhow::Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if text.starts_with("good") {
                0.8
            } else if text.starts_with("bad") {
                -0.6
            } else {
                0.0
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 15, 0, 0).unwrap()
    }

    fn iso(days_ago: i64) -> String {
        (now() - Duration::days(days_ago)).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn raw(id: &str, days_ago: i64, summary: &str) -> RawArticle {
        RawArticle {
            id: Some(id.to_string()),
            content: Some(RawArticleContent {
                pub_date: Some(iso(days_ago)),
                summary: Some(summary.to_string()),
            }),
        }
    }

    fn universe(tickers: &[&str]) -> Vec<TickerEntry> {
        tickers
            .iter()
            .map(|t| TickerEntry {
                ticker: t.to_string(),
                name: format!("{t} Inc."),
            })
            .collect()
    }

    fn opts() -> SweepOptions {
        SweepOptions {
            retention_days: 7,
            concurrency: 2,
            dry_run: false,
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        scorer: Arc<KeywordScorer>,
        collab: Collaborators,
    }

    fn harness(source: FakeSource) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let scorer = Arc::new(KeywordScorer::default());
        let collab = Collaborators {
            store: store.clone(),
            source: Arc::new(source),
            scorer: scorer.clone(),
        };
        Harness {
            store,
            scorer,
            collab,
        }
    }

    #[tokio::test]
    async fn sweep_persists_aggregates_and_recommendations() {
        let mut source = FakeSource::default();
        source.news.insert(
            "AAPL".to_string(),
            vec![raw("a1", 0, "good quarter"), raw("a2", 1, "good guidance")],
        );
        source
            .news
            .insert("TSLA".to_string(), vec![raw("t1", 0, "bad recall")]);
        let h = harness(source);

        let summary = run_sweep(&universe(&["AAPL", "TSLA"]), &h.collab, &opts(), now())
            .await
            .unwrap()
            .unwrap();

        assert!(summary.failed.is_empty());
        assert_eq!(summary.succeeded.len(), 2);

        let aapl = h.store.doc("AAPL").unwrap();
        assert_eq!(aapl["total_news"], json!(2));
        assert_eq!(aapl["news"].as_array().unwrap().len(), 2);
        assert_eq!(aapl["news"][0]["sentiment-score"], json!(0.8));

        let recs = h.store.recs.lock().unwrap().clone().unwrap();
        assert_eq!(recs.top_5_best[0].ticker, "AAPL");
        assert_eq!(recs.top_5_worst.last().unwrap().ticker, "TSLA");
        assert_eq!(recs, summary.recommendations);
        assert!(!*h.store.locked.lock().unwrap());
    }

    #[tokio::test]
    async fn scorer_only_sees_admissible_articles() {
        let mut source = FakeSource::default();
        source.news.insert(
            "AAPL".to_string(),
            vec![
                raw("kept", 1, "good old news"),
                raw("fresh", 0, "good new news"),
                raw("expired", 9, "bad stale news"),
                RawArticle {
                    id: Some("broken".to_string()),
                    content: None,
                },
            ],
        );
        let h = harness(source);
        let previous = json!({
            "ticker": "AAPL",
            "news": [{"id": "kept", "summary": "good old news", "date": iso(1), "sentiment-score": 0.5}]
        });
        h.store.put("AAPL", StoredDocument::Present(previous));

        let clock = ReferenceClock::resolve(now(), 7).unwrap();
        let outcome = ingest_ticker("AAPL", &clock, &h.collab, false).await.unwrap();

        assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.fetched, 4);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.carried_over, 1);
        assert_eq!(outcome.admitted, 1);
        assert_eq!(outcome.total_news, 2);

        let doc = h.store.doc("AAPL").unwrap();
        // The carried-over item keeps its stored score and position.
        assert_eq!(doc["news"][0]["id"], json!("kept"));
        assert_eq!(doc["news"][0]["sentiment-score"], json!(0.5));
        assert_eq!(doc["news"][1]["id"], json!("fresh"));
    }

    #[tokio::test]
    async fn source_failure_leaves_previous_aggregate_and_other_tickers_proceed() {
        let mut source = FakeSource::default();
        source.failing.push("TSLA".to_string());
        source
            .news
            .insert("AAPL".to_string(), vec![raw("a1", 0, "good day")]);
        let h = harness(source);

        let stale = json!({"ticker": "TSLA", "weighted_average_sentiment": -0.4, "news": []});
        h.store.put("TSLA", StoredDocument::Present(stale.clone()));

        let summary = run_sweep(&universe(&["AAPL", "TSLA"]), &h.collab, &opts(), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.failed, vec!["TSLA".to_string()]);
        assert_eq!(h.store.doc("TSLA").unwrap(), stale);
        // The stale-but-valid aggregate still takes part in the ranking.
        let worst: Vec<_> = summary
            .recommendations
            .top_5_worst
            .iter()
            .map(|r| r.ticker.as_str())
            .collect();
        assert_eq!(worst, vec!["AAPL", "TSLA"]);
    }

    #[tokio::test]
    async fn corrupt_previous_aggregate_is_rebuilt_from_fresh_items() {
        let mut source = FakeSource::default();
        source
            .news
            .insert("NVDA".to_string(), vec![raw("n1", 2, "good chips")]);
        let h = harness(source);
        h.store.put(
            "NVDA",
            StoredDocument::Corrupt {
                detail: "unexpected end of input".to_string(),
            },
        );

        let clock = ReferenceClock::resolve(now(), 7).unwrap();
        let outcome = ingest_ticker("NVDA", &clock, &h.collab, false).await.unwrap();
        assert_eq!(outcome.carried_over, 0);
        assert_eq!(outcome.total_news, 1);
        assert!(h.store.doc("NVDA").is_some());
    }

    #[tokio::test]
    async fn ranking_skips_tickers_without_aggregates() {
        let store = MemoryStore::default();
        store.put(
            "AAPL",
            StoredDocument::Present(json!({"weighted_average_sentiment": 0.2})),
        );
        store.put(
            "MSFT",
            StoredDocument::Corrupt {
                detail: "bad".to_string(),
            },
        );

        let ranked = collect_weighted_averages(&universe(&["AAPL", "MSFT", "GOOG"]), &store).await;
        assert_eq!(
            ranked,
            vec![RankedTicker {
                ticker: "AAPL".to_string(),
                weighted_average: 0.2,
            }]
        );
    }

    #[tokio::test]
    async fn held_lock_skips_the_sweep() {
        let h = harness(FakeSource::default());
        assert!(h.store.try_acquire_sweep_lock().await.unwrap());

        let res = run_sweep(&universe(&["AAPL"]), &h.collab, &opts(), now())
            .await
            .unwrap();
        assert!(res.is_none());
        assert!(h.store.doc("AAPL").is_none());
    }

    #[tokio::test]
    async fn dry_run_persists_nothing() {
        let mut source = FakeSource::default();
        source
            .news
            .insert("AAPL".to_string(), vec![raw("a1", 0, "good day")]);
        let h = harness(source);

        let dry = SweepOptions {
            dry_run: true,
            ..opts()
        };
        let summary = run_sweep(&universe(&["AAPL"]), &h.collab, &dry, now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.recommendations.top_5_best[0].ticker, "AAPL");
        assert!(h.store.doc("AAPL").is_none());
        assert!(h.store.recs.lock().unwrap().is_none());
    }
}
