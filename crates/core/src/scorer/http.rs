use crate::config::Settings;
use crate::scorer::error::ScorerDiagnosticsError;
use crate::scorer::{ClassProbabilities, SentimentScorer};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SCORER_NAME: &str = "http_text_classifier";
const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_MODEL: &str = "ProsusAI/finbert";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Scores text with a hosted three-class financial sentiment classifier.
#[derive(Debug, Clone)]
pub struct HttpScorer {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl HttpScorer {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_scorer_api_key()?.to_string();
        let base_url = settings
            .scorer_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("SCORER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_secs = std::env::var("SCORER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build scorer http client")?;

        tracing::info!(%base_url, %model, "sentiment scorer ready");

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }

    async fn classify(&self, text: &str) -> anyhow::Result<ClassProbabilities> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );

        let url = format!(
            "{}/models/{}",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&ClassifyRequest { inputs: text })
            .send()
            .await
            .context("scorer request failed")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("failed to read scorer response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&body).ok();
            return Err(ScorerDiagnosticsError {
                scorer: SCORER_NAME,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(body),
                raw_response_json,
            }
            .into());
        }

        parse_probabilities(&body)
    }
}

#[async_trait::async_trait]
impl SentimentScorer for HttpScorer {
    fn scorer_name(&self) -> &'static str {
        SCORER_NAME
    }

    async fn score(&self, text: &str) -> anyhow::Result<f64> {
        if text.trim().is_empty() {
            tracing::debug!("blank text; neutral score without classifier call");
            return Ok(0.0);
        }
        Ok(self.classify(text).await?.sentiment_score())
    }
}

impl Drop for HttpScorer {
    fn drop(&mut self) {
        tracing::debug!(model = %self.model, "sentiment scorer released");
    }
}

#[derive(Debug, Clone, Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// The endpoint answers `[[{label, score}, ..]]` for a single input; some deployments drop the
/// outer list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

fn parse_probabilities(body: &str) -> anyhow::Result<ClassProbabilities> {
    let parsed = serde_json::from_str::<ClassifyResponse>(body).map_err(|err| {
        ScorerDiagnosticsError {
            scorer: SCORER_NAME,
            stage: "decode",
            detail: err.to_string(),
            raw_output: Some(body.to_string()),
            raw_response_json: serde_json::from_str(body).ok(),
        }
    })?;

    let labels = match parsed {
        ClassifyResponse::Nested(mut outer) => {
            anyhow::ensure!(!outer.is_empty(), "scorer returned no predictions");
            outer.swap_remove(0)
        }
        ClassifyResponse::Flat(labels) => labels,
    };

    let mut positive = None;
    let mut negative = None;
    let mut neutral = None;
    for LabelScore { label, score } in labels {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => positive = Some(score),
            "negative" => negative = Some(score),
            "neutral" => neutral = Some(score),
            other => tracing::debug!(label = other, "ignoring unknown classifier label"),
        }
    }

    match (positive, negative, neutral) {
        (Some(positive), Some(negative), Some(neutral)) => Ok(ClassProbabilities {
            positive,
            negative,
            neutral,
        }),
        _ => Err(ScorerDiagnosticsError {
            scorer: SCORER_NAME,
            stage: "labels",
            detail: "expected positive, negative and neutral labels".to_string(),
            raw_output: Some(body.to_string()),
            raw_response_json: serde_json::from_str(body).ok(),
        }
        .into()),
    }
}
