//! Retrieval-augmented summarization pipeline.
//!
//! Data flow: document bytes → extraction → retrieval units → embedding →
//! vector index → per-audience retrieval → per-audience generation → two
//! summaries. The orchestrator in [`service`] sequences the stages and keeps
//! the two audience branches independent.

pub(crate) mod chunking;
pub(crate) mod prompts;
/// Audience-aware retrieval over the vector index.
pub mod retriever;
/// Pipeline orchestration service.
pub mod service;
/// Core pipeline data types and errors.
pub mod types;

pub use retriever::{RetrievalError, Retriever};
pub use service::{PipelineApi, PipelineOptions, PipelineService};
pub use types::{
    Audience, ChunkingError, ExtractedField, ExtractionRecord, PipelineError, PipelineOutcome,
    PipelineStage, RetrievalUnit, SourceFormat, StageFailure, Summary, SummaryError,
    SummaryRequest, ValidationError,
};

pub(crate) use types::current_timestamp_rfc3339;
