//! Verdict aggregation: the "weakest link" policy.
//!
//! The system is a review-triage tool, so one passing signal must never
//! mask a failing one. Overall confidence is the minimum across all scored
//! components; anything uncertain or unverifiable forces review. House
//! rules override general rules addressing the same element — the override
//! is enforced here, not silently by corpus load order.

use tracing::debug;

use citecheck_core::rule::{Severity, SourcePriority};
use citecheck_core::{
    Citation, FindingStatus, QuoteCheck, SupportAssessment, ValidationFinding, Verdict,
};

pub struct ConfidenceAggregator {
    review_threshold: u8,
}

impl ConfidenceAggregator {
    /// `review_threshold`: verdicts with overall confidence strictly below
    /// this require review regardless of other signals.
    pub fn new(review_threshold: u8) -> Self {
        Self { review_threshold }
    }

    /// Merge all per-citation results into one verdict. Idempotent: the
    /// same inputs always produce the same verdict.
    pub fn aggregate(
        &self,
        citation: &Citation,
        findings: Vec<ValidationFinding>,
        quote_checks: Vec<QuoteCheck>,
        support: Option<SupportAssessment>,
    ) -> Verdict {
        // House-over-general: a general finding is shadowed when any house
        // finding addresses the same element. All findings stay on the
        // verdict for the reviewer; only effective ones drive the outcome.
        let house_elements: Vec<&str> = findings
            .iter()
            .filter(|f| f.priority == SourcePriority::House)
            .map(|f| f.element.as_str())
            .collect();
        let effective: Vec<&ValidationFinding> = findings
            .iter()
            .filter(|f| {
                f.priority == SourcePriority::House
                    || !house_elements.contains(&f.element.as_str())
            })
            .collect();

        let mut confidence: u8 = 100;
        let mut requires_review = false;

        for finding in &effective {
            confidence = confidence.min(score_finding(finding));
            match finding.status {
                FindingStatus::Fail if finding.severity == Severity::High => {
                    requires_review = true;
                }
                FindingStatus::Uncertain => requires_review = true,
                _ => {}
            }
        }

        for check in &quote_checks {
            if !check.matched {
                confidence = 0;
                requires_review = true;
            }
        }

        if let Some(assessment) = &support {
            match assessment.confidence {
                Some(score) => confidence = confidence.min(score),
                // Unperformable support check: force review without
                // dragging the displayed score down.
                None => requires_review = true,
            }
        }

        if confidence < self.review_threshold {
            requires_review = true;
        }

        debug!(
            citation = %citation.id,
            confidence,
            requires_review,
            "verdict aggregated"
        );

        Verdict {
            citation_id: citation.id.clone(),
            footnote_number: citation.footnote_number,
            overall_confidence: confidence,
            requires_review,
            findings,
            quote_checks,
            support,
        }
    }
}

fn score_finding(finding: &ValidationFinding) -> u8 {
    match finding.status {
        FindingStatus::Pass => 100,
        FindingStatus::Uncertain => 50,
        FindingStatus::Fail => match finding.severity {
            Severity::High => 0,
            Severity::Medium => 30,
            Severity::Low => 60,
        },
    }
}
