use clap::Parser;
use magnifier_core::ingest::provider::HttpJsonNewsSource;
use magnifier_core::scorer::http::HttpScorer;
use magnifier_core::scorer::SentimentScorer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod sweep;
mod universe;

const DEFAULT_SCORER_CONCURRENCY: usize = 1;

#[derive(Debug, Parser)]
#[command(name = "magnifier_worker")]
struct Args {
    /// Run a single sweep and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Seconds between the start of consecutive sweeps.
    #[arg(long, default_value_t = 3600)]
    interval_secs: u64,

    /// Retention window in days. Defaults to RETENTION_DAYS (7).
    #[arg(long)]
    retention_days: Option<i64>,

    /// Ticker universe JSON. Defaults to STOCKLIST_PATH.
    #[arg(long)]
    universe: Option<PathBuf>,

    /// Do everything except writing aggregates and recommendations.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = magnifier_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let universe_path = args
        .universe
        .clone()
        .unwrap_or_else(|| settings.stocklist_path.clone());
    let opts = sweep::SweepOptions {
        retention_days: args.retention_days.unwrap_or(settings.retention_days),
        concurrency: std::env::var("SCORER_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_SCORER_CONCURRENCY),
        dry_run: args.dry_run,
    };
    anyhow::ensure!(opts.retention_days >= 1, "retention days must be >= 1");

    let store = magnifier_core::storage::open(&settings).await?;
    let source = Arc::new(HttpJsonNewsSource::from_settings(&settings)?);

    if args.once {
        return run_cycle(&settings, &universe_path, store, source, &opts).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(interval_secs = args.interval_secs, "scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                return Ok(());
            }
        }

        if let Err(err) =
            run_cycle(&settings, &universe_path, store.clone(), source.clone(), &opts).await
        {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "sweep cycle failed");
        }
    }
}

async fn run_cycle(
    settings: &magnifier_core::config::Settings,
    universe_path: &std::path::Path,
    store: Arc<dyn magnifier_core::storage::AggregateStore>,
    source: Arc<HttpJsonNewsSource>,
    opts: &sweep::SweepOptions,
) -> anyhow::Result<()> {
    let universe = universe::load_universe(universe_path)?;

    // One scorer per sweep, released when the sweep ends.
    let scorer: Arc<dyn SentimentScorer> = Arc::new(HttpScorer::from_settings(settings)?);
    let collab = sweep::Collaborators {
        store,
        source,
        scorer,
    };

    match sweep::run_sweep(&universe, &collab, opts, chrono::Utc::now()).await? {
        Some(summary) => {
            for o in &summary.succeeded {
                tracing::debug!(
                    ticker = %o.ticker,
                    carried_over = o.carried_over,
                    fetched = o.fetched,
                    rejected = o.rejected,
                    admitted = o.admitted,
                    total_news = o.total_news,
                    weighted_average = o.weighted_average,
                    "ticker outcome"
                );
            }
            tracing::info!(
                run_id = %summary.run_id,
                succeeded = summary.succeeded.len(),
                failed = ?summary.failed,
                best = ?summary.recommendations.top_5_best,
                worst = ?summary.recommendations.top_5_worst,
                "collection executed"
            );
        }
        None => tracing::warn!("sweep skipped"),
    }
    Ok(())
}

fn init_sentry(settings: &magnifier_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
