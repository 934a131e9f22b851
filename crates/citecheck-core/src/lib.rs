pub mod citation;
pub mod config;
pub mod finding;
pub mod quote;
pub mod rule;

pub use citation::{Citation, CitationKind, FootnoteRecord, QuoteSpan};
pub use config::EngineConfig;
pub use finding::{
    FindingStatus, QuoteCheck, SupportAssessment, ValidationFinding, Verdict,
};
pub use quote::{verify_quote, EllipsisForm, QuoteMatch};
pub use rule::{DetectionStrategy, Rule, RuleScope, Severity, SourcePriority, StructuralCheckKind};
