//! Deterministic validation: pattern, keyword, and structural-check rules.
//!
//! Fully synchronous, no remote calls, and idempotent — the same citation
//! and rule set always produce identical findings, in rule-id order.
//! Prior-citation context (for short-form checks) is passed explicitly;
//! there is no shared global state.

use tracing::debug;

use citecheck_core::quote::{leading_ellipsis, trailing_ellipsis, EllipsisForm};
use citecheck_core::rule::StructuralCheckKind;
use citecheck_core::{Citation, DetectionStrategy, FindingStatus, ValidationFinding};

use crate::repository::CompiledRule;

/// Prior citations of the document, in footnote order. Built once per run
/// from the parsed manuscript and handed to each validation call.
#[derive(Debug, Default)]
pub struct DocumentContext {
    entries: Vec<ContextEntry>,
}

#[derive(Debug)]
struct ContextEntry {
    footnote_number: u32,
    raw_text: String,
    is_short_form: bool,
}

impl DocumentContext {
    pub fn from_citations<'a>(citations: impl IntoIterator<Item = &'a Citation>) -> Self {
        let mut entries: Vec<ContextEntry> = citations
            .into_iter()
            .map(|c| ContextEntry {
                footnote_number: c.footnote_number,
                raw_text: c.raw_text.clone(),
                is_short_form: c.components.contains_key("short_form"),
            })
            .collect();
        entries.sort_by_key(|e| e.footnote_number);
        Self { entries }
    }

    /// Full-form citations appearing strictly before the given footnote.
    fn full_forms_before(&self, footnote_number: u32) -> impl Iterator<Item = &ContextEntry> {
        self.entries
            .iter()
            .filter(move |e| e.footnote_number < footnote_number && !e.is_short_form)
    }

    fn any_before(&self, footnote_number: u32) -> bool {
        self.entries
            .iter()
            .any(|e| e.footnote_number < footnote_number)
    }
}

/// Applies deterministic rules to a parsed citation.
pub struct DeterministicValidator;

impl DeterministicValidator {
    /// Evaluate the deterministic subset of `rules` against one citation.
    ///
    /// Reasoning-query rules are skipped here; the pipeline routes those
    /// through the reasoning boundary. Findings come back sorted by rule id
    /// so the result is independent of dispatch order.
    pub fn validate(
        &self,
        citation: &Citation,
        rules: &[&CompiledRule],
        context: &DocumentContext,
    ) -> Vec<ValidationFinding> {
        let mut findings: Vec<ValidationFinding> = rules
            .iter()
            .filter_map(|compiled| self.apply(citation, compiled, context))
            .collect();
        findings.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        debug!(
            citation = %citation.id,
            findings = findings.len(),
            "deterministic validation complete"
        );
        findings
    }

    fn apply(
        &self,
        citation: &Citation,
        compiled: &CompiledRule,
        context: &DocumentContext,
    ) -> Option<ValidationFinding> {
        let (status, evidence) = match &compiled.rule.strategy {
            DetectionStrategy::Pattern { must_match, .. } => {
                // Compiled at corpus load; absent only for non-pattern rules.
                let regex = compiled.regex.as_ref()?;
                match (regex.find(&citation.raw_text), must_match) {
                    (Some(m), true) => (FindingStatus::Pass, format!("matched {:?}", m.as_str())),
                    (None, true) => (
                        FindingStatus::Fail,
                        "pattern did not match citation text".to_string(),
                    ),
                    (Some(m), false) => (
                        FindingStatus::Fail,
                        format!("forbidden pattern matched {:?}", m.as_str()),
                    ),
                    (None, false) => (FindingStatus::Pass, "forbidden pattern absent".to_string()),
                }
            }
            DetectionStrategy::KeywordSet { any_of, forbidden } => {
                keyword_check(&citation.raw_text, any_of, forbidden)
            }
            DetectionStrategy::StructuralCheck { check } => match check {
                StructuralCheckKind::NestedParenthetical => nested_parenthetical(citation),
                StructuralCheckKind::ShortFormAntecedent => short_form_antecedent(citation, context),
                StructuralCheckKind::EllipsisBoundary => ellipsis_boundary(citation),
            },
            DetectionStrategy::ReasoningQuery { .. } => return None,
        };

        Some(ValidationFinding {
            citation_id: citation.id.clone(),
            rule_id: compiled.rule.id.clone(),
            status,
            evidence,
            strategy_used: compiled.rule.strategy.name().to_string(),
            severity: compiled.rule.severity,
            priority: compiled.rule.priority,
            element: compiled.rule.scope.element.clone(),
        })
    }
}

fn keyword_check(
    raw: &str,
    any_of: &[String],
    forbidden: &[String],
) -> (FindingStatus, String) {
    let lower = raw.to_lowercase();
    if let Some(hit) = forbidden.iter().find(|k| lower.contains(&k.to_lowercase())) {
        return (
            FindingStatus::Fail,
            format!("forbidden keyword present: {hit:?}"),
        );
    }
    if !any_of.is_empty() {
        return match any_of.iter().find(|k| lower.contains(&k.to_lowercase())) {
            Some(hit) => (FindingStatus::Pass, format!("keyword present: {hit:?}")),
            None => (
                FindingStatus::Fail,
                format!("none of the expected keywords present: {any_of:?}"),
            ),
        };
    }
    (FindingStatus::Pass, "no forbidden keywords present".to_string())
}

/// Nested parenthetical without bracket substitution.
fn nested_parenthetical(citation: &Citation) -> (FindingStatus, String) {
    let mut depth = 0u32;
    for (i, c) in citation.raw_text.char_indices() {
        match c {
            '(' => {
                depth += 1;
                if depth > 1 {
                    let snippet: String = citation.raw_text[i..].chars().take(20).collect();
                    return (
                        FindingStatus::Fail,
                        format!("nested parenthetical at {:?}", snippet),
                    );
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    (FindingStatus::Pass, "no nested parentheticals".to_string())
}

/// A short-form reference must follow a full-form citation earlier in the
/// document.
fn short_form_antecedent(
    citation: &Citation,
    context: &DocumentContext,
) -> (FindingStatus, String) {
    let Some(form) = citation.components.get("short_form") else {
        return (
            FindingStatus::Pass,
            "not a short-form reference".to_string(),
        );
    };

    match form.as_str() {
        "id" => {
            if context.any_before(citation.footnote_number) {
                (FindingStatus::Pass, "preceding citation exists".to_string())
            } else {
                (
                    FindingStatus::Fail,
                    "id. reference with no preceding citation".to_string(),
                )
            }
        }
        _ => {
            // supra and named short forms need an earlier full-form citation
            // mentioning the referent.
            let referent = citation.components.get("referent");
            let found = context
                .full_forms_before(citation.footnote_number)
                .any(|e| match referent {
                    Some(name) => e.raw_text.contains(name.as_str()),
                    None => true,
                });
            if found {
                (
                    FindingStatus::Pass,
                    "antecedent full-form citation found".to_string(),
                )
            } else {
                (
                    FindingStatus::Fail,
                    match referent {
                        Some(name) => {
                            format!("no earlier full-form citation mentions {name:?}")
                        }
                        None => "no earlier full-form citation found".to_string(),
                    },
                )
            }
        }
    }
}

/// Elision boundary legality over the citation's quoted spans.
///
/// A quotation may not open with an elision, and a quotation-final elision
/// must use the four-dot form. Encoded as rule data so a corpus that wants
/// different boundary semantics simply ships a different rule.
fn ellipsis_boundary(citation: &Citation) -> (FindingStatus, String) {
    for span in &citation.quoted_spans {
        if leading_ellipsis(&span.text).is_some() {
            return (
                FindingStatus::Fail,
                format!("span {} begins with an elision", span.index),
            );
        }
        if trailing_ellipsis(&span.text) == Some(EllipsisForm::ThreeDot) {
            return (
                FindingStatus::Fail,
                format!(
                    "span {} ends with a three-dot elision; four dots required",
                    span.index
                ),
            );
        }
    }
    (FindingStatus::Pass, "elision boundaries legal".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use citecheck_core::rule::{Rule, RuleScope, Severity, SourcePriority};
    use citecheck_core::{CitationKind, QuoteSpan};
    use regex::Regex;
    use std::collections::BTreeMap;

    fn citation(raw: &str) -> Citation {
        Citation {
            id: "fn-1".into(),
            footnote_number: 1,
            raw_text: raw.into(),
            kind: CitationKind::Case,
            components: BTreeMap::new(),
            quoted_spans: vec![],
            proposition: None,
            source_excerpt: None,
        }
    }

    fn compiled(id: &str, strategy: DetectionStrategy) -> CompiledRule {
        let regex = match &strategy {
            DetectionStrategy::Pattern { pattern, .. } => Some(Regex::new(pattern).unwrap()),
            _ => None,
        };
        CompiledRule {
            rule: Rule {
                id: id.into(),
                priority: SourcePriority::General,
                severity: Severity::Medium,
                scope: RuleScope {
                    citation_kinds: vec![],
                    element: "format".into(),
                },
                strategy,
                description: "test".into(),
            },
            regex,
        }
    }

    #[test]
    fn pattern_rule_pass_carries_matched_substring() {
        let rule = compiled(
            "r1",
            DetectionStrategy::Pattern {
                pattern: r"\d+ U\.S\. \d+".into(),
                must_match: true,
            },
        );
        let c = citation("Smith v. Jones, 100 U.S. 1 (1980)");
        let findings =
            DeterministicValidator.validate(&c, &[&rule], &DocumentContext::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, FindingStatus::Pass);
        assert!(findings[0].evidence.contains("100 U.S. 1"));
    }

    #[test]
    fn forbidden_pattern_fails_on_match() {
        let rule = compiled(
            "r1",
            DetectionStrategy::Pattern {
                pattern: r"\d+ U\. S\. \d+".into(),
                must_match: false,
            },
        );
        let c = citation("Smith v. Jones, 100 U. S. 1 (1980)");
        let findings =
            DeterministicValidator.validate(&c, &[&rule], &DocumentContext::default());
        assert_eq!(findings[0].status, FindingStatus::Fail);
    }

    #[test]
    fn keyword_rule_checks_both_lists() {
        let rule = compiled(
            "r1",
            DetectionStrategy::KeywordSet {
                any_of: vec!["v.".into()],
                forbidden: vec!["versus".into()],
            },
        );
        let ok = citation("Smith v. Jones, 100 U.S. 1 (1980)");
        let bad = citation("Smith versus Jones");

        let validator = DeterministicValidator;
        let context = DocumentContext::default();
        assert_eq!(
            validator.validate(&ok, &[&rule], &context)[0].status,
            FindingStatus::Pass
        );
        assert_eq!(
            validator.validate(&bad, &[&rule], &context)[0].status,
            FindingStatus::Fail
        );
    }

    #[test]
    fn reasoning_rules_are_skipped() {
        let rule = compiled(
            "r1",
            DetectionStrategy::ReasoningQuery {
                template: "Check {citation}".into(),
            },
        );
        let c = citation("Smith v. Jones, 100 U.S. 1 (1980)");
        let findings =
            DeterministicValidator.validate(&c, &[&rule], &DocumentContext::default());
        assert!(findings.is_empty());
    }

    #[test]
    fn validate_is_idempotent_and_order_independent() {
        let pattern = compiled(
            "b-pattern",
            DetectionStrategy::Pattern {
                pattern: r"\(\d{4}\)".into(),
                must_match: true,
            },
        );
        let keywords = compiled(
            "a-keywords",
            DetectionStrategy::KeywordSet {
                any_of: vec!["v.".into()],
                forbidden: vec![],
            },
        );
        let c = citation("Smith v. Jones, 100 U.S. 1 (1980)");
        let context = DocumentContext::default();

        let validator = DeterministicValidator;
        let forward = validator.validate(&c, &[&pattern, &keywords], &context);
        let reversed = validator.validate(&c, &[&keywords, &pattern], &context);
        let again = validator.validate(&c, &[&pattern, &keywords], &context);

        let ids = |fs: &[ValidationFinding]| {
            fs.iter()
                .map(|f| (f.rule_id.clone(), f.status))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&forward), ids(&reversed));
        assert_eq!(ids(&forward), ids(&again));
        assert_eq!(forward[0].rule_id, "a-keywords");
    }

    #[test]
    fn nested_parenthetical_detected() {
        let rule = compiled(
            "r1",
            DetectionStrategy::StructuralCheck {
                check: StructuralCheckKind::NestedParenthetical,
            },
        );
        let flat = citation("Smith v. Jones, 100 U.S. 1 (1980) (en banc)");
        let nested = citation("Smith v. Jones, 100 U.S. 1 (1980) (quoting Doe (J., dissenting))");

        let validator = DeterministicValidator;
        let context = DocumentContext::default();
        assert_eq!(
            validator.validate(&flat, &[&rule], &context)[0].status,
            FindingStatus::Pass
        );
        assert_eq!(
            validator.validate(&nested, &[&rule], &context)[0].status,
            FindingStatus::Fail
        );
    }

    #[test]
    fn short_form_requires_antecedent() {
        let rule = compiled(
            "r1",
            DetectionStrategy::StructuralCheck {
                check: StructuralCheckKind::ShortFormAntecedent,
            },
        );

        let full = citation("Smith v. Jones, 100 U.S. 1 (1980)");
        let mut short = citation("Smith, supra note 1, at 5");
        short.footnote_number = 2;
        short.id = "fn-2".into();
        short
            .components
            .insert("short_form".into(), "supra".into());
        short.components.insert("referent".into(), "Smith".into());

        let validator = DeterministicValidator;

        // With the full form in context: pass.
        let context = DocumentContext::from_citations([&full, &short]);
        assert_eq!(
            validator.validate(&short, &[&rule], &context)[0].status,
            FindingStatus::Pass
        );

        // Without it: fail.
        let empty = DocumentContext::from_citations([&short]);
        assert_eq!(
            validator.validate(&short, &[&rule], &empty)[0].status,
            FindingStatus::Fail
        );
    }

    #[test]
    fn id_reference_needs_any_preceding_citation() {
        let rule = compiled(
            "r1",
            DetectionStrategy::StructuralCheck {
                check: StructuralCheckKind::ShortFormAntecedent,
            },
        );
        let mut id_cite = citation("Id. at 12");
        id_cite.components.insert("short_form".into(), "id".into());

        let validator = DeterministicValidator;
        let alone = DocumentContext::from_citations([&id_cite]);
        assert_eq!(
            validator.validate(&id_cite, &[&rule], &alone)[0].status,
            FindingStatus::Fail
        );
    }

    #[test]
    fn ellipsis_boundary_rules() {
        let rule = compiled(
            "r1",
            DetectionStrategy::StructuralCheck {
                check: StructuralCheckKind::EllipsisBoundary,
            },
        );
        let validator = DeterministicValidator;
        let context = DocumentContext::default();

        let mut leading = citation("Smith v. Jones, 100 U.S. 1 (1980)");
        leading.quoted_spans = vec![QuoteSpan {
            index: 0,
            text: ". . . erred in its ruling".into(),
        }];
        assert_eq!(
            validator.validate(&leading, &[&rule], &context)[0].status,
            FindingStatus::Fail
        );

        let mut trailing_three = leading.clone();
        trailing_three.quoted_spans = vec![QuoteSpan {
            index: 0,
            text: "the court erred . . .".into(),
        }];
        assert_eq!(
            validator.validate(&trailing_three, &[&rule], &context)[0].status,
            FindingStatus::Fail
        );

        let mut trailing_four = leading.clone();
        trailing_four.quoted_spans = vec![QuoteSpan {
            index: 0,
            text: "the court erred . . . .".into(),
        }];
        assert_eq!(
            validator.validate(&trailing_four, &[&rule], &context)[0].status,
            FindingStatus::Pass
        );
    }
}
