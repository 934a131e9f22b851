//! Reasoning-service boundary: request/response wire types, the provider
//! trait, and the HTTP provider.
//!
//! The engine never assumes a specific vendor. Any service implementing the
//! `{query, context_snippets} → {verdict-or-score, rationale}` contract is
//! interchangeable; the provider is selected by configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Typed errors at the reasoning boundary. Retryability is a property of
/// the variant, not the caller's guess.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("transient service failure: {0}")]
    Transient(String),
    #[error("rate limited by reasoning service")]
    RateLimited,
    #[error("reasoning call timed out")]
    Timeout,
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ReasoningError {
    /// Transient errors are retried; permanent ones fail the dependent
    /// finding immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited | Self::Timeout)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningRequest {
    pub query: String,
    #[serde(default)]
    pub context_snippets: Vec<String>,
}

/// `verdict` is set for rule checks ("pass"/"fail"/"uncertain"), `score`
/// (0–100) for support assessments. A provider may return either or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningResponse {
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub rationale: String,
}

/// The seam the recovery machinery wraps. Implemented by the HTTP provider
/// in production and by scripted mocks in tests.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn assess(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError>;
}

/// HTTP reasoning provider.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProvider {
    /// `base_url` should be like `https://reasoner.example.com` (no trailing
    /// slash).
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ReasoningProvider for HttpProvider {
    async fn assess(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        let url = format!("{}/v1/assess", self.base_url);

        let mut req = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body));
        }

        let parsed: ReasoningResponse = resp
            .json()
            .await
            .map_err(|e| ReasoningError::Permanent(format!("malformed response: {e}")))?;
        info!(url = %url, verdict = ?parsed.verdict, score = ?parsed.score, "reasoning call answered");
        Ok(parsed)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ReasoningError {
    if e.is_timeout() {
        ReasoningError::Timeout
    } else if e.is_connect() || e.is_request() {
        ReasoningError::Transient(e.to_string())
    } else {
        ReasoningError::Permanent(e.to_string())
    }
}

fn classify_status(status: u16, body: String) -> ReasoningError {
    match status {
        429 => ReasoningError::RateLimited,
        408 => ReasoningError::Timeout,
        500..=599 => ReasoningError::Transient(format!("server returned {status}: {body}")),
        _ => ReasoningError::Permanent(format!("server returned {status}: {body}")),
    }
}
