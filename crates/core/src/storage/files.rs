use crate::domain::news::TickerAggregate;
use crate::domain::recommendation::RecommendationSet;
use crate::storage::{is_valid_ticker, AggregateStore, StoredDocument};
use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const NEWS_DIR: &str = "news_data";
const RECOMMENDATIONS_FILE: &str = "recommendations.json";
const LOCK_FILE: &str = ".sweep.lock";
// Two hourly sweep intervals.
const DEFAULT_LOCK_STALE_SECS: u64 = 2 * 3600;

/// One pretty-printed JSON file per ticker under `<data_dir>/news_data/`, plus
/// `<data_dir>/recommendations.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
    lock_stale_after: Duration,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let stale_secs = std::env::var("SWEEP_LOCK_STALE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LOCK_STALE_SECS);

        Self {
            data_dir: data_dir.into(),
            lock_stale_after: Duration::from_secs(stale_secs),
        }
    }

    pub fn aggregate_path(&self, ticker: &str) -> PathBuf {
        self.data_dir
            .join(NEWS_DIR)
            .join(format!("{}_news.json", ticker.trim().to_ascii_lowercase()))
    }

    fn recommendations_path(&self) -> PathBuf {
        self.data_dir.join(RECOMMENDATIONS_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    /// A lock is stale when its holder process is gone, or when it is older than
    /// `lock_stale_after`.
    async fn lock_is_stale(&self, path: &Path) -> bool {
        if let Some(pid) = read_lock_pid(path).await {
            if process_alive(pid) == Some(false) {
                tracing::warn!(pid, "sweep lock holder is no longer running");
                return true;
            }
        }

        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.lock_stale_after)
            .unwrap_or(false)
    }

    async fn create_lock_file(&self, path: &Path) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let stamp = format!(
            "pid={} acquired_at={}\n",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        file.write_all(stamp.as_bytes()).await?;
        file.flush().await
    }
}

async fn read_lock_pid(path: &Path) -> Option<u32> {
    let body = tokio::fs::read_to_string(path).await.ok()?;
    body.split_whitespace()
        .find_map(|field| field.strip_prefix("pid="))?
        .parse()
        .ok()
}

/// `None` where liveness cannot be checked (no procfs). Assumes the lock was taken on this host.
fn process_alive(pid: u32) -> Option<bool> {
    let proc_root = Path::new("/proc");
    if !proc_root.is_dir() {
        return None;
    }
    Some(proc_root.join(pid.to_string()).exists())
}

/// Writes through a sibling temp file and renames it into place, so readers never observe a
/// half-written document.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create dir {} failed", parent.display()))?;
    }

    let body = serde_json::to_vec_pretty(value).context("serialize json failed")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("write {} failed", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename {} -> {} failed", tmp.display(), path.display()))?;
    Ok(())
}

#[async_trait::async_trait]
impl AggregateStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "files"
    }

    async fn load_document(&self, ticker: &str) -> anyhow::Result<StoredDocument> {
        anyhow::ensure!(is_valid_ticker(ticker), "invalid ticker symbol {ticker:?}");
        let path = self.aggregate_path(ticker);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StoredDocument::Missing),
            Err(err) => {
                return Err(err).with_context(|| format!("read {} failed", path.display()));
            }
        };

        Ok(match serde_json::from_slice::<Value>(&bytes) {
            Ok(doc) if doc.is_object() => StoredDocument::Present(doc),
            Ok(doc) => StoredDocument::Corrupt {
                detail: format!("{} is not a JSON object: {doc}", path.display()),
            },
            Err(err) => StoredDocument::Corrupt {
                detail: format!("{}: {err}", path.display()),
            },
        })
    }

    async fn save_aggregate(&self, aggregate: &TickerAggregate) -> anyhow::Result<()> {
        anyhow::ensure!(
            is_valid_ticker(&aggregate.ticker),
            "invalid ticker symbol {:?}",
            aggregate.ticker
        );
        write_json_atomic(&self.aggregate_path(&aggregate.ticker), aggregate).await
    }

    async fn load_recommendations(&self) -> anyhow::Result<Option<RecommendationSet>> {
        let path = self.recommendations_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read {} failed", path.display())),
        };
        let set = serde_json::from_slice::<RecommendationSet>(&bytes)
            .with_context(|| format!("{} has an unexpected shape", path.display()))?;
        Ok(Some(set))
    }

    async fn save_recommendations(&self, set: &RecommendationSet) -> anyhow::Result<()> {
        write_json_atomic(&self.recommendations_path(), set).await
    }

    async fn try_acquire_sweep_lock(&self) -> anyhow::Result<bool> {
        let path = self.lock_path();
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("create dir {} failed", self.data_dir.display()))?;

        match self.create_lock_file(&path).await {
            Ok(()) => return Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(err).with_context(|| format!("create {} failed", path.display()))
            }
        }

        if !self.lock_is_stale(&path).await {
            return Ok(false);
        }

        tracing::warn!(path = %path.display(), "removing stale sweep lock");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove {} failed", path.display()))
            }
        }

        match self.create_lock_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err).with_context(|| format!("create {} failed", path.display())),
        }
    }

    async fn release_sweep_lock(&self) -> anyhow::Result<()> {
        let path = self.lock_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {} failed", path.display())),
        }
    }
}
