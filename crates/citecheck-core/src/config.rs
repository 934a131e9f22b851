//! Engine configuration.
//!
//! Everything the spec leaves tunable lives here: retry policy, circuit
//! breaker thresholds, rate-limit ceilings, per-call timeout, worker count,
//! and the confidence threshold below which a verdict requires review.
//! Loadable from a JSON file; every field has a default.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(std::path::PathBuf),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    // Retry policy (transient errors only).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,

    // Circuit breaker.
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_ms: u64,

    // Rate limiting.
    pub max_concurrent_calls: usize,
    pub max_calls_per_interval: u32,
    pub rate_interval_ms: u64,
    /// How long a caller may block waiting for rate-limit headroom before
    /// its finding degrades.
    pub rate_wait_timeout_ms: u64,

    /// Per-call timeout, independent of the retry policy.
    pub call_timeout_ms: u64,

    /// Verdicts with overall confidence below this require review.
    pub review_threshold: u8,

    /// Bounded parallelism across citations.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            breaker_failure_threshold: 5,
            breaker_cooldown_ms: 30_000,
            max_concurrent_calls: 4,
            max_calls_per_interval: 60,
            rate_interval_ms: 60_000,
            rate_wait_timeout_ms: 30_000,
            call_timeout_ms: 60_000,
            review_threshold: 80,
            workers: 4,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file. Unknown fields are rejected so a
    /// typo cannot silently fall back to a default.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }
}
