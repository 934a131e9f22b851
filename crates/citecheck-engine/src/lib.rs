pub mod aggregate;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use aggregate::ConfidenceAggregator;
pub use pipeline::ValidationPipeline;
pub use progress::{CheckpointError, CitationStatus, ProgressTracker};
pub use report::{Report, ReportGenerator, ReviewEntry, StructuredReport};
