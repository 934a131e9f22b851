//! End-to-end validation orchestration.
//!
//! Parsing, deterministic validation, and aggregation are cheap and local;
//! the reasoning boundary is the only remote dependency. Citations are
//! validated independently under a bounded worker pool, each checkpointed
//! as it completes. Cancellation is cooperative: in-flight citations finish
//! or stop at a phase boundary, unstarted ones stay pending.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};

use citecheck_core::quote::verify_quote;
use citecheck_core::{
    Citation, DetectionStrategy, EngineConfig, FootnoteRecord, QuoteCheck, ValidationFinding,
    Verdict,
};
use citecheck_reason::{ReasoningClient, ReasoningRequest, SupportChecker};
use citecheck_rules::{CitationParser, CompiledRule, DeterministicValidator, DocumentContext, RuleIndex};

use crate::aggregate::ConfidenceAggregator;
use crate::progress::ProgressTracker;

pub struct ValidationPipeline {
    rules: Arc<RuleIndex>,
    parser: CitationParser,
    validator: DeterministicValidator,
    client: Arc<ReasoningClient>,
    aggregator: ConfidenceAggregator,
    workers: usize,
}

impl ValidationPipeline {
    pub fn new(rules: Arc<RuleIndex>, client: Arc<ReasoningClient>, config: &EngineConfig) -> Self {
        Self {
            rules,
            parser: CitationParser::new(),
            validator: DeterministicValidator,
            client,
            aggregator: ConfidenceAggregator::new(config.review_threshold),
            workers: config.workers.max(1),
        }
    }

    /// Validate every not-yet-completed record, checkpointing each verdict
    /// as it lands. Returns the complete verdict set for the run, including
    /// verdicts recovered from an earlier interrupted attempt, ordered by
    /// footnote number.
    pub async fn run(
        &self,
        records: &[FootnoteRecord],
        tracker: &ProgressTracker,
        cancel: watch::Receiver<bool>,
    ) -> Vec<Verdict> {
        let citations: Vec<Citation> = records.iter().map(|r| self.parser.parse(r)).collect();
        let context = DocumentContext::from_citations(&citations);

        let pending: HashSet<String> = tracker.pending().into_iter().collect();
        let todo: Vec<&Citation> = citations.iter().filter(|c| pending.contains(&c.id)).collect();
        info!(
            total = citations.len(),
            pending = todo.len(),
            workers = self.workers,
            "validation run starting"
        );

        let mut results = stream::iter(todo)
            .map(|citation| {
                let cancel = cancel.clone();
                self.validate_one(citation, &context, cancel)
            })
            .buffer_unordered(self.workers);

        while let Some(result) = results.next().await {
            if let Some(verdict) = result {
                tracker.mark_completed(&verdict);
            }
        }
        drop(results);

        let mut verdicts = tracker.completed_verdicts();
        verdicts.sort_by_key(|v| v.footnote_number);
        info!(
            completed = verdicts.len(),
            cancelled = *cancel.borrow(),
            "validation run finished"
        );
        verdicts
    }

    /// Validate one citation through all phases. Returns `None` when
    /// cancellation interrupts the work; the citation stays pending.
    async fn validate_one(
        &self,
        citation: &Citation,
        context: &DocumentContext,
        cancel: watch::Receiver<bool>,
    ) -> Option<Verdict> {
        if *cancel.borrow() {
            return None;
        }

        let (deterministic, reasoning) = self.rules.dispatch_split(citation);
        let mut findings = self.validator.validate(citation, &deterministic, context);

        // Remote phases only past this point. Cancellation stops new
        // reasoning calls immediately; in-flight calls finish on their own.
        for compiled in &reasoning {
            if *cancel.borrow() {
                debug!(citation = %citation.id, "cancelled during reasoning phase");
                return None;
            }
            if let DetectionStrategy::ReasoningQuery { template } = &compiled.rule.strategy {
                findings.push(self.ask_rule(citation, compiled, template).await);
            }
        }
        findings.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        let quote_checks = self.check_quotes(citation);

        if *cancel.borrow() {
            debug!(citation = %citation.id, "cancelled before support check");
            return None;
        }
        let support = SupportChecker::new(&self.client).check(citation).await;

        Some(self.aggregator.aggregate(citation, findings, quote_checks, support))
    }

    /// Route one reasoning-query rule through the guarded client.
    async fn ask_rule(
        &self,
        citation: &Citation,
        compiled: &CompiledRule,
        template: &str,
    ) -> ValidationFinding {
        let query = template
            .replace("{citation}", &citation.raw_text)
            .replace("{context}", citation.proposition.as_deref().unwrap_or(""));

        let mut context_snippets = Vec::new();
        if let Some(excerpt) = &citation.source_excerpt {
            context_snippets.push(excerpt.clone());
        }

        let outcome = self
            .client
            .ask(ReasoningRequest {
                query,
                context_snippets,
            })
            .await;
        let (status, evidence) = outcome.into_finding();

        ValidationFinding {
            citation_id: citation.id.clone(),
            rule_id: compiled.rule.id.clone(),
            status,
            evidence,
            strategy_used: "reasoning_query".into(),
            severity: compiled.rule.severity,
            priority: compiled.rule.priority,
            element: compiled.rule.scope.element.clone(),
        }
    }

    /// Verify every quoted span against the retrieved source excerpt. A
    /// span with no excerpt to check against is an unverifiable quote and
    /// fails closed.
    fn check_quotes(&self, citation: &Citation) -> Vec<QuoteCheck> {
        citation
            .quoted_spans
            .iter()
            .map(|span| match &citation.source_excerpt {
                Some(excerpt) => {
                    let result = verify_quote(&span.text, excerpt);
                    QuoteCheck {
                        citation_id: citation.id.clone(),
                        span_index: span.index,
                        matched: result.matched,
                        diff: result.diff,
                    }
                }
                None => QuoteCheck {
                    citation_id: citation.id.clone(),
                    span_index: span.index,
                    matched: false,
                    diff: Some("no source excerpt retrieved; quotation unverifiable".into()),
                },
            })
            .collect()
    }
}
