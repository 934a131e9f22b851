pub mod client;
pub mod provider;
pub mod recovery;
pub mod support;

pub use client::{AskOutcome, ReasoningClient};
pub use provider::{HttpProvider, ReasoningError, ReasoningProvider, ReasoningRequest, ReasoningResponse};
pub use recovery::{CallOutcome, CircuitBreaker, DegradedReason, ErrorRecoveryManager, RateLimiter, RecoveryConfig};
pub use support::SupportChecker;
