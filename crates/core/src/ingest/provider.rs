use crate::config::Settings;
use crate::ingest::types::RawArticle;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/news";
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;
const MAX_BACKOFF_SECS: u64 = 60;

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_news(&self, ticker: &str) -> Result<Vec<RawArticle>>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonNewsSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonNewsSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_news_provider_base_url()?.to_string();
        let api_key = settings.news_provider_api_key.clone();

        let timeout_secs = std::env::var("NEWS_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("NEWS_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);

        let path = std::env::var("NEWS_PROVIDER_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build news provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, ticker: &str) -> Result<Vec<RawArticle>> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[("ticker", ticker)])
            .send()
            .await
            .context("news provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read news provider response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("news provider response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("news provider HTTP {status}: {raw_json}");
        }

        parse_articles(ticker, raw_json)
    }
}

#[async_trait::async_trait]
impl NewsSource for HttpJsonNewsSource {
    fn source_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_news(&self, ticker: &str) -> Result<Vec<RawArticle>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(ticker).await {
                Ok(articles) => return Ok(articles),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ticker, ?backoff, error = %err, "news fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Doubling delay after the `attempt`-th failure (1s, 2s, 4s, ..), capped at a minute.
fn retry_backoff(attempt: u32) -> Duration {
    let secs = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// Accepts either a bare array of records or an object with a `news` array. Records that are not
/// even objects are dropped here; field-level checks happen at validation.
fn parse_articles(ticker: &str, raw_json: Value) -> Result<Vec<RawArticle>> {
    let records = match raw_json {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("news") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => anyhow::bail!("news provider `news` field is not an array: {other}"),
        },
        other => anyhow::bail!("unexpected news provider response shape: {other}"),
    };

    let mut out = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<RawArticle>(record.clone()) {
            Ok(article) => out.push(article),
            Err(err) => {
                tracing::warn!(ticker, error = %err, %record, "unrecognizable news record; skipping");
            }
        }
    }
    Ok(out)
}
