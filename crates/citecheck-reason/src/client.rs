//! Reasoning client: the only suspension point in the pipeline.
//!
//! Every `ask` passes through the [`ErrorRecoveryManager`]; callers never
//! see a raw transport error. A degraded path yields an uncertain outcome
//! with the degradation recorded as evidence, never an aborted run.

use std::sync::Arc;

use tracing::debug;

use citecheck_core::FindingStatus;

use crate::provider::{ReasoningProvider, ReasoningRequest, ReasoningResponse};
use crate::recovery::{CallOutcome, ErrorRecoveryManager};

/// What an `ask` produced, after recovery policy.
#[derive(Debug)]
pub enum AskOutcome {
    Answered(ReasoningResponse),
    /// Short-circuited or exhausted; the finding becomes uncertain.
    Degraded { evidence: String },
    /// Permanent failure; fails this citation's reasoning-dependent
    /// findings only.
    Failed { evidence: String },
}

impl AskOutcome {
    /// Interpret the outcome as a finding status plus evidence for a
    /// reasoning-query rule.
    pub fn into_finding(self) -> (FindingStatus, String) {
        match self {
            Self::Answered(response) => {
                let status = match response.verdict.as_deref() {
                    Some("pass") => FindingStatus::Pass,
                    Some("fail") => FindingStatus::Fail,
                    // Missing or unrecognised verdicts route to review.
                    _ => FindingStatus::Uncertain,
                };
                (status, response.rationale)
            }
            Self::Degraded { evidence } | Self::Failed { evidence } => {
                (FindingStatus::Uncertain, evidence)
            }
        }
    }
}

/// Guarded boundary around the remote reasoning service.
pub struct ReasoningClient {
    provider: Arc<dyn ReasoningProvider>,
    recovery: ErrorRecoveryManager,
}

impl ReasoningClient {
    pub fn new(provider: Arc<dyn ReasoningProvider>, recovery: ErrorRecoveryManager) -> Self {
        Self { provider, recovery }
    }

    /// Ask the reasoning service one question under full recovery policy.
    pub async fn ask(&self, request: ReasoningRequest) -> AskOutcome {
        debug!(query = %request.query, snippets = request.context_snippets.len(), "reasoning ask");
        let provider = self.provider.clone();
        let outcome = self
            .recovery
            .execute(|| {
                let provider = provider.clone();
                let request = request.clone();
                async move { provider.assess(&request).await }
            })
            .await;

        match outcome {
            CallOutcome::Answered(response) => AskOutcome::Answered(response),
            CallOutcome::Degraded(reason) => AskOutcome::Degraded {
                evidence: reason.evidence(),
            },
            CallOutcome::Failed(error) => AskOutcome::Failed {
                evidence: error.to_string(),
            },
        }
    }
}
