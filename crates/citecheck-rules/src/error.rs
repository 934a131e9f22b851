use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus file not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("failed to read corpus: {0}")]
    Io(#[from] std::io::Error),

    #[error("corpus schema violation: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("rule {rule_id}: invalid pattern: {source}")]
    InvalidPattern {
        rule_id: String,
        source: regex::Error,
    },

    #[error("duplicate rule id: {0}")]
    DuplicateId(String),

    #[error("rule {rule_id} declares priority {declared} but came from the {tier} corpus")]
    PriorityMismatch {
        rule_id: String,
        declared: &'static str,
        tier: &'static str,
    },

    #[error("rule {rule_id}: keyword-set rule with no keywords")]
    EmptyKeywordSet { rule_id: String },

    #[error("corpus contains no rules")]
    Empty,
}
