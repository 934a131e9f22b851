//! Rule corpus types.
//!
//! A rule names its source tier (house style always overrides the general
//! rule set), a severity, a scope (which citation kinds and which element it
//! addresses), and a detection strategy. The strategy set is closed: the
//! corpus schema fixes it, so it is a tagged enum rather than a trait object.

use serde::{Deserialize, Serialize};

use crate::citation::{Citation, CitationKind};

/// Which rule set a rule comes from. House rules override general rules
/// addressing the same (citation kind, element) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Journal/house style — always wins on conflict.
    House,
    General,
}

impl SourcePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::House => "house",
            Self::General => "general",
        }
    }
}

/// Reviewer-facing weight of a rule violation. `High` failures always force
/// human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Structural invariants checked without patterns or remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralCheckKind {
    /// No nested parenthetical without bracket substitution.
    NestedParenthetical,
    /// A short-form reference must follow a full-form citation earlier in
    /// the document.
    ShortFormAntecedent,
    /// Elision boundary legality (leading/trailing three-dot vs four-dot).
    EllipsisBoundary,
}

impl StructuralCheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NestedParenthetical => "nested_parenthetical",
            Self::ShortFormAntecedent => "short_form_antecedent",
            Self::EllipsisBoundary => "ellipsis_boundary",
        }
    }
}

/// How a rule is detected. Closed set, fixed by the corpus schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Regex applied to the citation's raw text.
    Pattern {
        pattern: String,
        /// `true`: the pattern must match for the rule to pass.
        /// `false`: a match is a violation.
        #[serde(default = "default_true")]
        must_match: bool,
    },
    /// Keyword heuristic over the raw text.
    KeywordSet {
        /// Rule passes if any of these appear (case-insensitive).
        #[serde(default)]
        any_of: Vec<String>,
        /// Rule fails if any of these appear.
        #[serde(default)]
        forbidden: Vec<String>,
    },
    /// Natural-language query answered by the remote reasoning service.
    /// `{citation}` and `{context}` placeholders are filled at dispatch.
    ReasoningQuery { template: String },
    /// Built-in structural invariant.
    StructuralCheck { check: StructuralCheckKind },
}

fn default_true() -> bool {
    true
}

impl DetectionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pattern { .. } => "pattern",
            Self::KeywordSet { .. } => "keyword_set",
            Self::ReasoningQuery { .. } => "reasoning_query",
            Self::StructuralCheck { .. } => "structural_check",
        }
    }

    /// Whether this strategy resolves without any remote call.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Self::ReasoningQuery { .. })
    }
}

/// Which citations a rule addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleScope {
    /// Citation kinds the rule applies to. Empty means all kinds.
    #[serde(default)]
    pub citation_kinds: Vec<CitationKind>,
    /// The citation element the rule addresses, e.g. `"reporter"`,
    /// `"quotation"`, `"format"`.
    pub element: String,
}

/// One rule from the corpus. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub priority: SourcePriority,
    pub severity: Severity,
    pub scope: RuleScope,
    #[serde(flatten)]
    pub strategy: DetectionStrategy,
    pub description: String,
}

impl Rule {
    /// Whether this rule applies to the given citation's kind and elements.
    ///
    /// `Other` citations only receive deterministic format-intactness
    /// checks: reasoning-query rules never run against unclassifiable text.
    pub fn applies_to(&self, citation: &Citation) -> bool {
        if citation.kind == CitationKind::Other && !self.strategy.is_deterministic() {
            return false;
        }
        let kind_ok = self.scope.citation_kinds.is_empty()
            || self.scope.citation_kinds.contains(&citation.kind);
        kind_ok && citation.elements().contains(&self.scope.element.as_str())
    }
}
