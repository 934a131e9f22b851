//! Rule corpus loading and dispatch.
//!
//! Two prioritized sources feed the index: a house-style rule set that
//! always overrides the general rule set on the same (citation kind,
//! element) scope. The corpus is loaded once at startup, validated strictly
//! (any schema violation is fatal), and held immutable for the run.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use citecheck_core::rule::{DetectionStrategy, Rule, SourcePriority};
use citecheck_core::Citation;

use crate::error::CorpusError;

/// A rule with its pattern pre-compiled at load time.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    /// Present iff the rule uses the pattern strategy.
    pub regex: Option<Regex>,
}

/// Immutable, process-wide snapshot of the loaded corpus.
///
/// Passed by shared reference into each validation call; never mutated after
/// load.
#[derive(Debug)]
pub struct RuleIndex {
    rules: Vec<CompiledRule>,
    /// General-tier rule ids that a house rule overlaps in scope.
    overridden: HashSet<String>,
}

impl RuleIndex {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Whether a general-tier rule is shadowed by some house rule with an
    /// overlapping scope.
    pub fn is_overridden(&self, rule_id: &str) -> bool {
        self.overridden.contains(rule_id)
    }

    /// All rules applicable to this citation, house rules first, then by
    /// descending severity, then rule id. The order is deterministic so
    /// downstream findings are reproducible.
    pub fn dispatch(&self, citation: &Citation) -> Vec<&CompiledRule> {
        let mut applicable: Vec<&CompiledRule> = self
            .rules
            .iter()
            .filter(|c| c.rule.applies_to(citation))
            .collect();
        applicable.sort_by(|a, b| {
            a.rule
                .priority
                .cmp(&b.rule.priority)
                .then(b.rule.severity.cmp(&a.rule.severity))
                .then(a.rule.id.cmp(&b.rule.id))
        });
        applicable
    }

    /// Applicable rules split into (deterministic, reasoning) sets.
    pub fn dispatch_split(&self, citation: &Citation) -> (Vec<&CompiledRule>, Vec<&CompiledRule>) {
        self.dispatch(citation)
            .into_iter()
            .partition(|c| c.rule.strategy.is_deterministic())
    }
}

/// Loads and validates rule corpora.
pub struct RuleRepository;

impl RuleRepository {
    /// Load the house and general corpora into one immutable index.
    ///
    /// Fatal on a missing file, malformed JSON, unknown strategy tag,
    /// invalid regex, duplicate id, or a rule whose declared priority
    /// contradicts the file it came from.
    pub fn load(house: &Path, general: &Path) -> Result<RuleIndex, CorpusError> {
        let mut rules = Vec::new();
        rules.extend(load_tier(house, SourcePriority::House)?);
        rules.extend(load_tier(general, SourcePriority::General)?);
        if rules.is_empty() {
            return Err(CorpusError::Empty);
        }

        let mut seen = HashSet::new();
        for compiled in &rules {
            if !seen.insert(compiled.rule.id.clone()) {
                return Err(CorpusError::DuplicateId(compiled.rule.id.clone()));
            }
        }

        let overridden = find_overridden(&rules);
        info!(
            total = rules.len(),
            overridden = overridden.len(),
            "rule corpus loaded"
        );

        Ok(RuleIndex { rules, overridden })
    }
}

fn load_tier(path: &Path, tier: SourcePriority) -> Result<Vec<CompiledRule>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let rules: Vec<Rule> = serde_json::from_str(&text)?;

    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        if rule.priority != tier {
            return Err(CorpusError::PriorityMismatch {
                rule_id: rule.id,
                declared: rule.priority.as_str(),
                tier: tier.as_str(),
            });
        }
        compiled.push(compile_rule(rule)?);
    }
    info!(path = %path.display(), tier = tier.as_str(), count = compiled.len(), "corpus tier loaded");
    Ok(compiled)
}

fn compile_rule(rule: Rule) -> Result<CompiledRule, CorpusError> {
    let regex = match &rule.strategy {
        DetectionStrategy::Pattern { pattern, .. } => {
            let re = Regex::new(pattern).map_err(|source| CorpusError::InvalidPattern {
                rule_id: rule.id.clone(),
                source,
            })?;
            Some(re)
        }
        DetectionStrategy::KeywordSet { any_of, forbidden } => {
            if any_of.is_empty() && forbidden.is_empty() {
                return Err(CorpusError::EmptyKeywordSet {
                    rule_id: rule.id.clone(),
                });
            }
            None
        }
        _ => None,
    };
    Ok(CompiledRule { rule, regex })
}

/// General-tier rules whose scope overlaps a house rule. The aggregator
/// enforces the override per citation; the index records the edge so the
/// shadowing is visible at load time.
fn find_overridden(rules: &[CompiledRule]) -> HashSet<String> {
    let mut overridden = HashSet::new();
    let house: Vec<&CompiledRule> = rules
        .iter()
        .filter(|c| c.rule.priority == SourcePriority::House)
        .collect();

    for general in rules
        .iter()
        .filter(|c| c.rule.priority == SourcePriority::General)
    {
        for h in &house {
            if h.rule.scope.element == general.rule.scope.element
                && kinds_overlap(&h.rule, &general.rule)
            {
                debug!(
                    house = %h.rule.id,
                    general = %general.rule.id,
                    element = %general.rule.scope.element,
                    "house rule overrides general rule"
                );
                overridden.insert(general.rule.id.clone());
                break;
            }
        }
    }
    overridden
}

fn kinds_overlap(a: &Rule, b: &Rule) -> bool {
    // An empty kind list means "all kinds".
    a.scope.citation_kinds.is_empty()
        || b.scope.citation_kinds.is_empty()
        || a.scope
            .citation_kinds
            .iter()
            .any(|k| b.scope.citation_kinds.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use citecheck_core::CitationKind;
    use std::collections::BTreeMap;
    use std::io::Write;

    fn write_corpus(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    const HOUSE: &str = r#"[
        {
            "id": "H-1",
            "priority": "house",
            "severity": "high",
            "scope": { "citation_kinds": ["case"], "element": "reporter" },
            "strategy": "pattern",
            "pattern": "\\d+ U\\.S\\. \\d+",
            "description": "house reporter form"
        }
    ]"#;

    const GENERAL: &str = r#"[
        {
            "id": "G-1",
            "priority": "general",
            "severity": "medium",
            "scope": { "citation_kinds": ["case"], "element": "reporter" },
            "strategy": "pattern",
            "pattern": "\\d+ U\\. S\\. \\d+",
            "description": "general reporter form"
        },
        {
            "id": "G-2",
            "priority": "general",
            "severity": "low",
            "scope": { "element": "format" },
            "strategy": "keyword_set",
            "forbidden": ["  "],
            "description": "no double spaces"
        }
    ]"#;

    fn case_citation() -> Citation {
        let mut components = BTreeMap::new();
        components.insert("reporter".to_string(), "U.S.".to_string());
        Citation {
            id: "fn-1".into(),
            footnote_number: 1,
            raw_text: "Smith v. Jones, 100 U.S. 1 (1980)".into(),
            kind: CitationKind::Case,
            components,
            quoted_spans: vec![],
            proposition: None,
            source_excerpt: None,
        }
    }

    #[test]
    fn load_indexes_both_tiers() {
        let house = write_corpus(HOUSE);
        let general = write_corpus(GENERAL);
        let index = RuleRepository::load(house.path(), general.path()).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn house_overrides_general_on_same_scope() {
        let house = write_corpus(HOUSE);
        let general = write_corpus(GENERAL);
        let index = RuleRepository::load(house.path(), general.path()).unwrap();
        assert!(index.is_overridden("G-1"));
        assert!(!index.is_overridden("G-2"));
    }

    #[test]
    fn dispatch_orders_house_before_general() {
        let house = write_corpus(HOUSE);
        let general = write_corpus(GENERAL);
        let index = RuleRepository::load(house.path(), general.path()).unwrap();

        let dispatched = index.dispatch(&case_citation());
        assert_eq!(dispatched.len(), 3);
        assert_eq!(dispatched[0].rule.id, "H-1");
    }

    #[test]
    fn missing_file_is_fatal() {
        let general = write_corpus(GENERAL);
        let err = RuleRepository::load(Path::new("/nonexistent/house.json"), general.path())
            .unwrap_err();
        assert!(matches!(err, CorpusError::NotFound(_)));
    }

    #[test]
    fn invalid_regex_is_fatal() {
        let house = write_corpus(
            r#"[{
                "id": "H-bad",
                "priority": "house",
                "severity": "low",
                "scope": { "element": "format" },
                "strategy": "pattern",
                "pattern": "([unclosed",
                "description": "broken"
            }]"#,
        );
        let general = write_corpus(GENERAL);
        let err = RuleRepository::load(house.path(), general.path()).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidPattern { .. }));
    }

    #[test]
    fn unknown_strategy_is_fatal() {
        let house = write_corpus(
            r#"[{
                "id": "H-bad",
                "priority": "house",
                "severity": "low",
                "scope": { "element": "format" },
                "strategy": "oracle",
                "description": "unsupported"
            }]"#,
        );
        let general = write_corpus(GENERAL);
        let err = RuleRepository::load(house.path(), general.path()).unwrap_err();
        assert!(matches!(err, CorpusError::Schema(_)));
    }

    #[test]
    fn duplicate_id_is_fatal() {
        let house = write_corpus(HOUSE);
        let general = write_corpus(
            r#"[{
                "id": "H-1",
                "priority": "general",
                "severity": "low",
                "scope": { "element": "format" },
                "strategy": "keyword_set",
                "any_of": ["v."],
                "description": "duplicate id"
            }]"#,
        );
        let err = RuleRepository::load(house.path(), general.path()).unwrap_err();
        assert!(matches!(err, CorpusError::DuplicateId(id) if id == "H-1"));
    }

    #[test]
    fn priority_mismatch_is_fatal() {
        let house = write_corpus(GENERAL); // general-tagged rules in the house slot
        let general = write_corpus(GENERAL);
        let err = RuleRepository::load(house.path(), general.path()).unwrap_err();
        assert!(matches!(err, CorpusError::PriorityMismatch { .. }));
    }

    #[test]
    fn empty_keyword_set_is_fatal() {
        let house = write_corpus(
            r#"[{
                "id": "H-kw",
                "priority": "house",
                "severity": "low",
                "scope": { "element": "format" },
                "strategy": "keyword_set",
                "description": "no keywords at all"
            }]"#,
        );
        let general = write_corpus(GENERAL);
        let err = RuleRepository::load(house.path(), general.path()).unwrap_err();
        assert!(matches!(err, CorpusError::EmptyKeywordSet { .. }));
    }
}
