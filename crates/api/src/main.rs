use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use magnifier_core::domain::news::TickerEntry;
use magnifier_core::domain::recommendation::RecommendationSet;
use magnifier_core::storage::{is_valid_ticker, AggregateStore, StoredDocument};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8091;

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

    let store = match magnifier_core::storage::open(&settings).await {
        Ok(store) => Some(store),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "storage unavailable; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        store,
        stocklist_path: Arc::new(settings.stocklist_path.clone()),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/data/:ticker", get(get_ticker_news))
        .route("/stock", get(get_stock_list))
        .route("/recommendations", get(get_recommendations))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Option<Arc<dyn AggregateStore>>,
    stocklist_path: Arc<PathBuf>,
}

async fn get_ticker_news(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if !is_valid_ticker(&ticker) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let doc = store.load_document(&ticker).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match doc {
        StoredDocument::Present(v) => Ok(Json(v)),
        StoredDocument::Missing => Err(StatusCode::NOT_FOUND),
        StoredDocument::Corrupt { detail } => {
            tracing::error!(%ticker, %detail, "stored aggregate is corrupt");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_stock_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<TickerEntry>>, StatusCode> {
    let path = state.stocklist_path.as_path();
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read stock list");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    serde_json::from_slice::<Vec<TickerEntry>>(&bytes)
        .map(Json)
        .map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "invalid stock list JSON");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_recommendations(
    State(state): State<AppState>,
) -> Result<Json<RecommendationSet>, StatusCode> {
    let Some(store) = &state.store else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    store
        .load_recommendations()
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
