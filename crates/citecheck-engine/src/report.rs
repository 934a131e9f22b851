//! Report generation: the structured JSON report and the reviewer-facing
//! queue.
//!
//! Rendering is deterministic: verdicts are sorted by footnote number and
//! the generation timestamp is supplied by the caller, so the same verdict
//! set always produces byte-identical output regardless of the order the
//! workers finished in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use citecheck_core::rule::Severity;
use citecheck_core::{FindingStatus, Verdict};

/// Machine-readable run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub total_citations: usize,
    pub review_count: usize,
    /// All verdicts, ordered by footnote number.
    pub verdicts: Vec<Verdict>,
}

/// One entry in the reviewer-facing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub footnote_number: u32,
    pub citation_id: String,
    pub overall_confidence: u8,
    pub flagged_severity: Option<Severity>,
    /// Human-readable lines explaining why review is needed.
    pub evidence: Vec<String>,
}

/// A structured report plus its prioritized review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub structured: StructuredReport,
    pub review_queue: Vec<ReviewEntry>,
}

pub struct ReportGenerator;

impl ReportGenerator {
    /// Build the full report from a run's verdicts. `generated_at` is a
    /// parameter so output stays reproducible.
    pub fn render(
        run_id: &str,
        mut verdicts: Vec<Verdict>,
        generated_at: DateTime<Utc>,
    ) -> Report {
        verdicts.sort_by_key(|v| v.footnote_number);

        let review_queue = build_review_queue(&verdicts);
        let structured = StructuredReport {
            run_id: run_id.to_string(),
            generated_at,
            total_citations: verdicts.len(),
            review_count: review_queue.len(),
            verdicts,
        };
        Report {
            structured,
            review_queue,
        }
    }

    /// Plain-text rendering of the review queue for terminal display.
    pub fn review_queue_text(report: &Report) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Review queue for {} ({} of {} citations flagged)\n",
            report.structured.run_id,
            report.review_queue.len(),
            report.structured.total_citations,
        ));
        if report.review_queue.is_empty() {
            out.push_str("  nothing to review\n");
            return out;
        }
        for entry in &report.review_queue {
            let severity = entry
                .flagged_severity
                .map(|s| s.as_str())
                .unwrap_or("none");
            out.push_str(&format!(
                "\nfootnote {} ({})  confidence {}  severity {}\n",
                entry.footnote_number, entry.citation_id, entry.overall_confidence, severity,
            ));
            for line in &entry.evidence {
                out.push_str(&format!("  - {line}\n"));
            }
        }
        out
    }
}

/// Review entries sorted most-urgent-first: highest flagged severity, then
/// lowest confidence, then footnote number as a stable tiebreak.
fn build_review_queue(verdicts: &[Verdict]) -> Vec<ReviewEntry> {
    let mut queue: Vec<ReviewEntry> = verdicts
        .iter()
        .filter(|v| v.requires_review)
        .map(|v| ReviewEntry {
            footnote_number: v.footnote_number,
            citation_id: v.citation_id.clone(),
            overall_confidence: v.overall_confidence,
            flagged_severity: v.max_flagged_severity(),
            evidence: evidence_lines(v),
        })
        .collect();
    queue.sort_by(|a, b| {
        // None sorts after any concrete severity.
        let sev = |e: &ReviewEntry| match e.flagged_severity {
            Some(Severity::High) => 0u8,
            Some(Severity::Medium) => 1,
            Some(Severity::Low) => 2,
            None => 3,
        };
        sev(a)
            .cmp(&sev(b))
            .then(a.overall_confidence.cmp(&b.overall_confidence))
            .then(a.footnote_number.cmp(&b.footnote_number))
    });
    queue
}

fn evidence_lines(verdict: &Verdict) -> Vec<String> {
    let mut lines = Vec::new();
    for finding in &verdict.findings {
        if finding.status == FindingStatus::Pass {
            continue;
        }
        let detail = if finding.evidence.is_empty() {
            String::new()
        } else {
            format!(": {}", finding.evidence)
        };
        lines.push(format!(
            "rule {} {} ({} {}){}",
            finding.rule_id,
            finding.status.as_str(),
            finding.severity.as_str(),
            finding.element,
            detail,
        ));
    }
    for check in &verdict.quote_checks {
        if !check.matched {
            let diff = check.diff.as_deref().unwrap_or("no divergence detail");
            lines.push(format!("quote {} mismatch: {diff}", check.span_index));
        }
    }
    if let Some(support) = &verdict.support {
        match support.confidence {
            Some(score) => lines.push(format!("support score {score}: {}", support.rationale)),
            None => lines.push(format!("support unverified: {}", support.rationale)),
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use citecheck_core::rule::SourcePriority;
    use citecheck_core::{QuoteCheck, SupportAssessment, ValidationFinding};

    fn verdict(footnote: u32, confidence: u8, review: bool) -> Verdict {
        Verdict {
            citation_id: format!("fn-{footnote}"),
            footnote_number: footnote,
            overall_confidence: confidence,
            requires_review: review,
            findings: vec![],
            quote_checks: vec![],
            support: None,
        }
    }

    fn failing(footnote: u32, confidence: u8, severity: Severity) -> Verdict {
        let mut v = verdict(footnote, confidence, true);
        v.findings.push(ValidationFinding {
            citation_id: v.citation_id.clone(),
            rule_id: "r1".into(),
            status: FindingStatus::Fail,
            evidence: "missing reporter".into(),
            strategy_used: "pattern".into(),
            severity,
            priority: SourcePriority::General,
            element: "reporter".into(),
        });
        v
    }

    #[test]
    fn verdicts_sorted_by_footnote() {
        let report = ReportGenerator::render(
            "run-x",
            vec![verdict(3, 100, false), verdict(1, 100, false), verdict(2, 100, false)],
            Utc::now(),
        );
        let footnotes: Vec<u32> = report
            .structured
            .verdicts
            .iter()
            .map(|v| v.footnote_number)
            .collect();
        assert_eq!(footnotes, vec![1, 2, 3]);
        assert_eq!(report.structured.review_count, 0);
    }

    #[test]
    fn review_queue_orders_by_severity_then_confidence() {
        let report = ReportGenerator::render(
            "run-x",
            vec![
                failing(1, 60, Severity::Low),
                failing(2, 0, Severity::High),
                failing(3, 30, Severity::Medium),
                failing(4, 10, Severity::High),
            ],
            Utc::now(),
        );
        let order: Vec<u32> = report
            .review_queue
            .iter()
            .map(|e| e.footnote_number)
            .collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
    }

    #[test]
    fn entries_without_flagged_findings_sort_last() {
        // Flagged only by a quote mismatch, so no finding severity.
        let mut quote_only = verdict(1, 0, true);
        quote_only.quote_checks.push(QuoteCheck {
            citation_id: "fn-1".into(),
            span_index: 0,
            matched: false,
            diff: Some("expected 'e', found 'a'".into()),
        });
        let report = ReportGenerator::render(
            "run-x",
            vec![quote_only, failing(2, 60, Severity::Low)],
            Utc::now(),
        );
        let order: Vec<u32> = report
            .review_queue
            .iter()
            .map(|e| e.footnote_number)
            .collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn evidence_lines_cover_all_signal_kinds() {
        let mut v = failing(7, 0, Severity::High);
        v.quote_checks.push(QuoteCheck {
            citation_id: "fn-7".into(),
            span_index: 0,
            matched: false,
            diff: Some("expected 'holding' at source offset 14".into()),
        });
        v.support = Some(SupportAssessment {
            citation_id: "fn-7".into(),
            confidence: None,
            rationale: "reasoning service unavailable".into(),
        });
        let report = ReportGenerator::render("run-x", vec![v], Utc::now());
        let entry = &report.review_queue[0];
        assert_eq!(entry.evidence.len(), 3);
        assert!(entry.evidence[0].starts_with("rule r1 fail"));
        assert!(entry.evidence[1].contains("quote 0 mismatch"));
        assert!(entry.evidence[2].starts_with("support unverified"));
    }

    #[test]
    fn rendering_is_input_order_independent() {
        let at = Utc::now();
        let a = vec![
            failing(1, 60, Severity::Low),
            failing(2, 0, Severity::High),
            verdict(3, 100, false),
        ];
        let mut b = a.clone();
        b.reverse();
        let left = ReportGenerator::render("run-x", a, at);
        let right = ReportGenerator::render("run-x", b, at);
        assert_eq!(
            serde_json::to_string(&left.structured).unwrap(),
            serde_json::to_string(&right.structured).unwrap()
        );
        assert_eq!(
            ReportGenerator::review_queue_text(&left),
            ReportGenerator::review_queue_text(&right)
        );
    }

    #[test]
    fn passing_findings_produce_no_evidence() {
        let mut v = verdict(1, 40, true);
        v.findings.push(ValidationFinding {
            citation_id: "fn-1".into(),
            rule_id: "ok".into(),
            status: FindingStatus::Pass,
            evidence: "matched".into(),
            strategy_used: "pattern".into(),
            severity: Severity::High,
            priority: SourcePriority::House,
            element: "format".into(),
        });
        v.support = Some(SupportAssessment {
            citation_id: "fn-1".into(),
            confidence: Some(40),
            rationale: "weak".into(),
        });
        let report = ReportGenerator::render("run-x", vec![v], Utc::now());
        let entry = &report.review_queue[0];
        assert_eq!(entry.evidence, vec!["support score 40: weak".to_string()]);
    }
}
