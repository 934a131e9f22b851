//! Per-citation result records: findings, quote checks, support assessments,
//! and the aggregated verdict. All append-only; nothing here mutates a
//! citation.

use serde::{Deserialize, Serialize};

use crate::rule::{Severity, SourcePriority};

/// Outcome of one rule applied to one citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Pass,
    Fail,
    /// The rule could not be resolved (degraded reasoning path, exhausted
    /// retries). Always forces human review.
    Uncertain,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Uncertain => "uncertain",
        }
    }
}

/// One rule outcome for one citation.
///
/// Severity, priority, and element are copied from the rule so aggregation
/// can resolve house-over-general conflicts without re-consulting the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub citation_id: String,
    pub rule_id: String,
    pub status: FindingStatus,
    /// Matched/unmatched substring, service rationale, or degradation note.
    pub evidence: String,
    /// Strategy name that produced this finding.
    pub strategy_used: String,
    pub severity: Severity,
    pub priority: SourcePriority,
    pub element: String,
}

/// Character-level comparison result for one quoted span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteCheck {
    pub citation_id: String,
    pub span_index: usize,
    pub matched: bool,
    /// First divergence point, when `matched` is false.
    pub diff: Option<String>,
}

/// Whether the cited source substantiates the attached proposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportAssessment {
    pub citation_id: String,
    /// 0–100. `None` means the check could not be performed; the aggregator
    /// treats that as requiring review, never as a pass.
    pub confidence: Option<u8>,
    pub rationale: String,
}

/// The aggregate per-citation verdict. Recomputable idempotently from its
/// inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub citation_id: String,
    pub footnote_number: u32,
    /// Minimum across all scored components ("weakest link").
    pub overall_confidence: u8,
    pub requires_review: bool,
    pub findings: Vec<ValidationFinding>,
    pub quote_checks: Vec<QuoteCheck>,
    pub support: Option<SupportAssessment>,
}

impl Verdict {
    /// Highest severity among failing or uncertain findings, used for
    /// review-queue ordering.
    pub fn max_flagged_severity(&self) -> Option<Severity> {
        self.findings
            .iter()
            .filter(|f| f.status != FindingStatus::Pass)
            .map(|f| f.severity)
            .max()
    }
}
