//! Core data types and error definitions for the summarization pipeline.

use crate::{
    embedding::EmbeddingError, extraction::ExtractionError, generation::GenerationError,
    index::IndexError,
};
use serde::Serialize;
use thiserror::Error;

/// Document formats accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Photographed or scanned prescription.
    Image,
    /// PDF prescription.
    Pdf,
}

impl SourceFormat {
    /// Resolve a MIME type into a supported format.
    ///
    /// Unsupported types are rejected before the pipeline runs.
    pub fn from_mime(mime: &str) -> Result<Self, ValidationError> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" | "image/jpeg" | "image/jpg" => Ok(Self::Image),
            "application/pdf" => Ok(Self::Pdf),
            other => Err(ValidationError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Canonical MIME type forwarded to the extraction service.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Errors raised while validating an uploaded document.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Upload contained no bytes.
    #[error("document is empty")]
    EmptyDocument,
    /// MIME type is not one of the accepted prescription formats.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

/// One structured field extracted from a prescription document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedField {
    /// Field name, e.g. `medication`, `dosage`, `diagnosis`.
    pub name: String,
    /// Extracted value text.
    pub value: String,
    /// Optional confidence reported by the extraction service.
    pub confidence: Option<f32>,
}

/// Structured clinical data extracted from one uploaded document.
///
/// Created once per upload and immutable afterwards; owned by the orchestrator
/// for the lifetime of one request.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRecord {
    /// Unique identifier assigned to the uploaded document.
    pub document_id: String,
    /// Format of the source document.
    pub source_format: SourceFormat,
    /// Ordered structured fields, in extraction order.
    pub fields: Vec<ExtractedField>,
    /// Free-text notes, when the document carried any.
    pub raw_text: Option<String>,
}

impl ExtractionRecord {
    /// Iterate over the values of fields with the given name, in order.
    pub fn values_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.fields
            .iter()
            .filter(move |field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

/// Smallest piece of extracted content indexed and retrieved independently.
///
/// Derived one-to-many from an [`ExtractionRecord`]; write-once. The embedding
/// is absent only when the pipeline degraded to text-only retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalUnit {
    /// Identifier unique within the owning document.
    pub unit_id: String,
    /// Unit text content.
    pub text: String,
    /// Embedding vector, fixed dimensionality.
    pub embedding: Option<Vec<f32>>,
    /// Name of the record field this unit was derived from.
    pub source_field: String,
    /// Position of the unit within the document, used for stable tie-breaks.
    pub ordinal: usize,
}

/// Intended reader of a generated summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Clinician-facing summary: terminology and dosage precision.
    Doctor,
    /// Patient-facing summary: plain language and actionable instructions.
    Patient,
}

impl Audience {
    /// Lowercase label used in logs and stored payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless request for one audience-specific summary.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// Document whose units back the summary.
    pub document_id: String,
    /// Intended reader.
    pub audience: Audience,
}

/// Audience-specific summary produced by the generation step.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Intended reader of the text.
    pub audience: Audience,
    /// Generated summary text.
    pub text: String,
    /// Identifiers of the retrieval units cited as support.
    pub supporting_units: Vec<String>,
    /// RFC3339 timestamp recorded at generation time.
    pub generated_at: String,
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Document accepted, not yet validated.
    Received,
    /// Extraction call in flight.
    Extracting,
    /// Structured record available.
    Extracted,
    /// Chunking, embedding, and index writes in flight.
    Indexing,
    /// Units committed to the index (or text-only pool prepared).
    Indexed,
    /// Audience branch generating its summary.
    Summarizing(Audience),
    /// Both branches resolved.
    Done,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => f.write_str("RECEIVED"),
            Self::Extracting => f.write_str("EXTRACTING"),
            Self::Extracted => f.write_str("EXTRACTED"),
            Self::Indexing => f.write_str("INDEXING"),
            Self::Indexed => f.write_str("INDEXED"),
            Self::Summarizing(audience) => write!(f, "SUMMARIZING({audience})"),
            Self::Done => f.write_str("DONE"),
        }
    }
}

/// Errors produced while deriving retrieval units from a record.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Configured note chunk budget was zero.
    #[error("note chunk budget must be greater than zero")]
    InvalidChunkBudget,
}

/// Failure of a whole pipeline run, carrying the stage it occurred in.
///
/// Only extraction, indexing, and input validation abort the run; generation
/// failures stay scoped to their audience branch.
#[derive(Debug, Error)]
#[error("pipeline failed during {stage}: {source}")]
pub struct PipelineError {
    /// Stage the run failed in.
    pub stage: PipelineStage,
    /// Underlying cause.
    #[source]
    pub source: StageFailure,
}

/// Causes of a terminal pipeline failure.
#[derive(Debug, Error)]
pub enum StageFailure {
    /// Uploaded document failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Extraction service call failed or returned an unusable response.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Record could not be split into retrieval units.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Embedding service failed and degradation was not configured.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Vector index rejected the batch write.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Failure scoped to a single audience branch.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Retrieval of supporting units failed for this branch.
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] crate::pipeline::retriever::RetrievalError),
    /// Generation service failed for this branch.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Result of one full pipeline run.
///
/// Both summaries derive from the same extraction record and the same
/// retrieval pool; a failed branch carries its own error marker instead of
/// failing the sibling.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Identifier of the processed document.
    pub document_id: String,
    /// Immutable extraction record the summaries derive from.
    pub record: ExtractionRecord,
    /// Clinician-facing branch result.
    pub doctor: Result<Summary, SummaryError>,
    /// Patient-facing branch result.
    pub patient: Result<Summary, SummaryError>,
    /// Whether retrieval fell back to the un-embedded unit pool.
    pub degraded: bool,
}

/// Current timestamp formatted for summary metadata.
pub(crate) fn current_timestamp_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
