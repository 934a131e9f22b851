//! Support checking: does the cited source substantiate the proposition?
//!
//! Routed through the guarded reasoning client. No review threshold lives
//! here — thresholding is the aggregator's job so the policy stays centrally
//! configurable. On a degraded reasoning path the confidence is `None`,
//! which the aggregator must treat as requiring review.

use tracing::debug;

use citecheck_core::{Citation, SupportAssessment};

use crate::client::{AskOutcome, ReasoningClient};
use crate::provider::ReasoningRequest;

pub struct SupportChecker<'a> {
    client: &'a ReasoningClient,
}

impl<'a> SupportChecker<'a> {
    pub fn new(client: &'a ReasoningClient) -> Self {
        Self { client }
    }

    /// Assess whether the source excerpt supports the proposition attached
    /// to this citation. Returns `None` when the citation carries no
    /// proposition or no source excerpt — there is nothing to check.
    pub async fn check(&self, citation: &Citation) -> Option<SupportAssessment> {
        let proposition = citation.proposition.as_deref()?;
        let excerpt = citation.source_excerpt.as_deref()?;

        let request = ReasoningRequest {
            query: format!(
                "Does the source excerpt support this proposition? \
                 Answer with a score from 0 to 100 and a short rationale. \
                 Proposition: {proposition}"
            ),
            context_snippets: vec![excerpt.to_string()],
        };

        let assessment = match self.client.ask(request).await {
            AskOutcome::Answered(response) => SupportAssessment {
                citation_id: citation.id.clone(),
                confidence: response.score.map(|s| s.min(100)),
                rationale: if response.rationale.is_empty() {
                    "no rationale provided".to_string()
                } else {
                    response.rationale
                },
            },
            AskOutcome::Degraded { evidence } | AskOutcome::Failed { evidence } => {
                SupportAssessment {
                    citation_id: citation.id.clone(),
                    confidence: None,
                    rationale: format!("support check could not be performed: {evidence}"),
                }
            }
        };
        debug!(
            citation = %citation.id,
            confidence = ?assessment.confidence,
            "support check complete"
        );
        Some(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{
        ReasoningError, ReasoningProvider, ReasoningRequest, ReasoningResponse,
    };
    use crate::recovery::{ErrorRecoveryManager, RecoveryConfig};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedProvider(Result<ReasoningResponse, ()>);

    #[async_trait]
    impl ReasoningProvider for FixedProvider {
        async fn assess(
            &self,
            _request: &ReasoningRequest,
        ) -> Result<ReasoningResponse, ReasoningError> {
            match &self.0 {
                Ok(r) => Ok(r.clone()),
                Err(()) => Err(ReasoningError::Transient("503".into())),
            }
        }
    }

    fn citation(proposition: Option<&str>, excerpt: Option<&str>) -> Citation {
        Citation {
            id: "fn-1".into(),
            footnote_number: 1,
            raw_text: "Smith v. Jones, 100 U.S. 1 (1980)".into(),
            kind: citecheck_core::CitationKind::Case,
            components: BTreeMap::new(),
            quoted_spans: vec![],
            proposition: proposition.map(String::from),
            source_excerpt: excerpt.map(String::from),
        }
    }

    fn client(provider: FixedProvider) -> ReasoningClient {
        let config = RecoveryConfig {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            ..RecoveryConfig::default()
        };
        ReasoningClient::new(Arc::new(provider), ErrorRecoveryManager::new(config))
    }

    #[tokio::test]
    async fn scored_answer_becomes_confidence() {
        let client = client(FixedProvider(Ok(ReasoningResponse {
            verdict: None,
            score: Some(85),
            rationale: "the excerpt states the holding directly".into(),
        })));
        let checker = SupportChecker::new(&client);

        let assessment = checker
            .check(&citation(
                Some("The court held the statute ambiguous."),
                Some("We hold the statute is ambiguous."),
            ))
            .await
            .expect("checkable citation");
        assert_eq!(assessment.confidence, Some(85));
    }

    #[tokio::test]
    async fn degraded_service_yields_null_confidence() {
        let client = client(FixedProvider(Err(())));
        let checker = SupportChecker::new(&client);

        let assessment = checker
            .check(&citation(Some("proposition"), Some("excerpt")))
            .await
            .expect("checkable citation");
        assert!(assessment.confidence.is_none());
        assert!(assessment.rationale.contains("could not be performed"));
    }

    #[tokio::test]
    async fn nothing_to_check_without_proposition() {
        let client = client(FixedProvider(Ok(ReasoningResponse::default())));
        let checker = SupportChecker::new(&client);
        assert!(checker.check(&citation(None, Some("excerpt"))).await.is_none());
        assert!(checker.check(&citation(Some("p"), None)).await.is_none());
    }
}
