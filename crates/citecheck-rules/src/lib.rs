pub mod error;
pub mod parser;
pub mod repository;
pub mod validate;

pub use error::CorpusError;
pub use parser::CitationParser;
pub use repository::{CompiledRule, RuleIndex, RuleRepository};
pub use validate::{DeterministicValidator, DocumentContext};
