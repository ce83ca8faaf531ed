pub mod domain;
pub mod engine;
pub mod ingest;
pub mod scorer;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_DATA_DIR: &str = "data";
    const DEFAULT_RETENTION_DAYS: i64 = 7;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StorageBackend {
        Files,
        Postgres,
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub storage_backend: StorageBackend,
        pub data_dir: PathBuf,
        pub stocklist_path: PathBuf,
        pub retention_days: i64,
        pub sentry_dsn: Option<String>,
        pub news_provider_base_url: Option<String>,
        pub news_provider_api_key: Option<String>,
        pub scorer_base_url: Option<String>,
        pub scorer_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let database_url = std::env::var("DATABASE_URL").ok();
            let storage_backend = match std::env::var("STORAGE_BACKEND").ok().as_deref() {
                Some(s) => parse_backend(s)?,
                None if database_url.is_some() => StorageBackend::Postgres,
                None => StorageBackend::Files,
            };

            let data_dir = std::env::var("DATA_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
            let stocklist_path = std::env::var("STOCKLIST_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("stocklist.json"));

            let retention_days = match std::env::var("RETENTION_DAYS") {
                Ok(s) => s
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("RETENTION_DAYS must be an integer (got {s:?})"))?,
                Err(_) => DEFAULT_RETENTION_DAYS,
            };
            anyhow::ensure!(retention_days >= 1, "RETENTION_DAYS must be >= 1");

            Ok(Self {
                database_url,
                storage_backend,
                data_dir,
                stocklist_path,
                retention_days,
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                news_provider_base_url: std::env::var("NEWS_PROVIDER_BASE_URL").ok(),
                news_provider_api_key: std::env::var("NEWS_PROVIDER_API_KEY").ok(),
                scorer_base_url: std::env::var("SCORER_BASE_URL").ok(),
                scorer_api_key: std::env::var("SCORER_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_news_provider_base_url(&self) -> anyhow::Result<&str> {
            self.news_provider_base_url
                .as_deref()
                .context("NEWS_PROVIDER_BASE_URL is required")
        }

        pub fn require_scorer_api_key(&self) -> anyhow::Result<&str> {
            self.scorer_api_key
                .as_deref()
                .context("SCORER_API_KEY is required")
        }
    }

    fn parse_backend(s: &str) -> anyhow::Result<StorageBackend> {
        match s.trim().to_ascii_lowercase().as_str() {
            "files" | "file" => Ok(StorageBackend::Files),
            "postgres" | "pg" => Ok(StorageBackend::Postgres),
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?} (expected files|postgres)"),
        }
    }

}
