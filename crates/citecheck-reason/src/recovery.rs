//! Retry, circuit-breaking, and rate-limiting around the reasoning service.
//!
//! The circuit breaker is an explicit closed → open → half-open state
//! machine driven by observed call outcomes, so it is testable without any
//! network. The rate limiter combines a semaphore (in-flight concurrency)
//! with a sliding window (calls per interval); callers that exceed the
//! ceiling block up to a bounded wait and then degrade exactly like a
//! circuit-open result. Retries apply only to transient errors, with
//! exponential backoff and jitter.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{error, warn};

use citecheck_core::EngineConfig;

use crate::provider::ReasoningError;

/// Recovery policy, derived from [`EngineConfig`]. Everything here is
/// externally configurable; nothing is a constant.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub max_concurrent: usize,
    pub max_calls_per_interval: u32,
    pub interval: Duration,
    pub wait_timeout: Duration,
    pub call_timeout: Duration,
}

impl RecoveryConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
            failure_threshold: config.breaker_failure_threshold.max(1),
            cooldown: Duration::from_millis(config.breaker_cooldown_ms),
            max_concurrent: config.max_concurrent_calls.max(1),
            max_calls_per_interval: config.max_calls_per_interval.max(1),
            interval: Duration::from_millis(config.rate_interval_ms),
            wait_timeout: Duration::from_millis(config.rate_wait_timeout_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::from_engine(&EngineConfig::default())
    }
}

/// Why a call was degraded instead of answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    CircuitOpen,
    RateLimited,
    RetriesExhausted(String),
}

impl DegradedReason {
    /// Evidence string recorded on the degraded finding.
    pub fn evidence(&self) -> String {
        match self {
            Self::CircuitOpen => "service unavailable".to_string(),
            Self::RateLimited => "rate limit wait exceeded".to_string(),
            Self::RetriesExhausted(e) => format!("retries exhausted: {e}"),
        }
    }
}

/// Outcome of a guarded call.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Answered(T),
    /// The call could not be performed or resolved; the dependent finding
    /// degrades to uncertain. Never aborts the run.
    Degraded(DegradedReason),
    /// Permanent failure (bad request, auth). Fails the dependent finding
    /// only.
    Failed(ReasoningError),
}

// ── Circuit breaker ──

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    /// A single probe is in flight; all other callers short-circuit.
    HalfOpen,
}

/// Whether the breaker admits a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Proceed,
    ShortCircuit,
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Decide whether a call may proceed. After the cool-down elapses, the
    /// first caller through becomes the single half-open probe.
    pub fn admit(&self) -> BreakerDecision {
        let mut state = lock(&self.state);
        match *state {
            BreakerState::Closed { .. } => BreakerDecision::Proceed,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    *state = BreakerState::HalfOpen;
                    BreakerDecision::Proceed
                } else {
                    BreakerDecision::ShortCircuit
                }
            }
            BreakerState::HalfOpen => BreakerDecision::ShortCircuit,
        }
    }

    pub fn record_success(&self) {
        let mut state = lock(&self.state);
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = lock(&self.state);
        *state = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.threshold {
                    warn!(failures, "circuit breaker opened");
                    BreakerState::Open { since: Instant::now() }
                } else {
                    BreakerState::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            // Failed probe: re-open for a fresh cool-down.
            BreakerState::HalfOpen | BreakerState::Open { .. } => {
                warn!("circuit breaker probe failed; re-opened");
                BreakerState::Open { since: Instant::now() }
            }
        };
    }

    pub fn is_open(&self) -> bool {
        matches!(*lock(&self.state), BreakerState::Open { .. })
    }
}

// ── Rate limiter ──

pub struct RateLimiter {
    semaphore: Semaphore,
    window: Mutex<VecDeque<Instant>>,
    max_per_interval: u32,
    interval: Duration,
    wait_timeout: Duration,
}

/// Held for the duration of one call; releases concurrency on drop.
pub struct RatePermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl RateLimiter {
    pub fn new(
        max_concurrent: usize,
        max_per_interval: u32,
        interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent),
            window: Mutex::new(VecDeque::new()),
            max_per_interval,
            interval,
            wait_timeout,
        }
    }

    /// Acquire headroom for one call, blocking up to the bounded wait.
    /// `None` means the caller should degrade rather than call.
    pub async fn acquire(&self) -> Option<RatePermit<'_>> {
        let deadline = Instant::now() + self.wait_timeout;

        let permit = match tokio::time::timeout(self.wait_timeout, self.semaphore.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            _ => return None,
        };

        loop {
            let wait = {
                let mut window = lock(&self.window);
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.interval)
                {
                    window.pop_front();
                }
                if (window.len() as u32) < self.max_per_interval {
                    window.push_back(now);
                    None
                } else {
                    // Oldest entry guaranteed present when the window is full.
                    window
                        .front()
                        .map(|&oldest| self.interval - now.duration_since(oldest))
                }
            };
            match wait {
                None => return Some(RatePermit { _permit: permit }),
                Some(d) => {
                    if Instant::now() + d > deadline {
                        return None;
                    }
                    tokio::time::sleep(d).await;
                }
            }
        }
    }
}

// ── Recovery manager ──

/// Shared retry/circuit-breaker/rate-limit discipline for every remote
/// reasoning call.
pub struct ErrorRecoveryManager {
    config: RecoveryConfig,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
}

impl ErrorRecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        let breaker = CircuitBreaker::new(config.failure_threshold, config.cooldown);
        let limiter = RateLimiter::new(
            config.max_concurrent,
            config.max_calls_per_interval,
            config.interval,
            config.wait_timeout,
        );
        Self {
            config,
            breaker,
            limiter,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run a call under the full recovery policy. The per-call timeout is
    /// applied to every attempt independently of the retry budget, so one
    /// hung call can never stall a worker indefinitely.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReasoningError>>,
    {
        let mut backoff = self.config.initial_backoff;

        for attempt in 1..=self.config.max_attempts {
            if self.breaker.admit() == BreakerDecision::ShortCircuit {
                return CallOutcome::Degraded(DegradedReason::CircuitOpen);
            }

            let Some(_permit) = self.limiter.acquire().await else {
                return CallOutcome::Degraded(DegradedReason::RateLimited);
            };

            let result = match tokio::time::timeout(self.config.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ReasoningError::Timeout),
            };

            match result {
                Ok(value) => {
                    self.breaker.record_success();
                    return CallOutcome::Answered(value);
                }
                Err(e) if e.is_transient() => {
                    self.breaker.record_failure();
                    warn!(attempt, error = %e, "transient reasoning failure");
                    if attempt == self.config.max_attempts {
                        return CallOutcome::Degraded(DegradedReason::RetriesExhausted(
                            e.to_string(),
                        ));
                    }
                    tokio::time::sleep(jittered(backoff)).await;
                    backoff = backoff
                        .mul_f64(self.config.backoff_multiplier)
                        .min(self.config.max_backoff);
                }
                Err(e) => {
                    error!(error = %e, "permanent reasoning failure");
                    return CallOutcome::Failed(e);
                }
            }
        }

        CallOutcome::Degraded(DegradedReason::RetriesExhausted(
            "retry budget exhausted".to_string(),
        ))
    }
}

/// Equal jitter: half the delay fixed, half scaled by sub-second clock
/// noise. Avoids synchronized retry bursts without a PRNG dependency.
fn jittered(base: Duration) -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let frac = f64::from(nanos % 1000) / 1000.0;
    base / 2 + Duration::from_secs_f64(base.as_secs_f64() * 0.5 * frac)
}
