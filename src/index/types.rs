//! Shared types used by the vector index backends.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by vector index backends.
///
/// Raised only on storage-layer failure; an empty result set is never an error.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("index request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Backend configuration is incomplete for the selected backend.
    #[error("index misconfigured: {0}")]
    Misconfigured(String),
}

/// One entry written to the index: a unit's vector plus its payload.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Identifier unique within the owning document.
    pub unit_id: String,
    /// Position of the unit within the document, used for stable tie-breaks.
    pub ordinal: usize,
    /// Unit text stored as payload.
    pub text: String,
    /// Name of the record field the unit was derived from.
    pub source_field: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// Scored identifier returned by similarity queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredUnit {
    /// Identifier of the matched unit.
    pub unit_id: String,
    /// Similarity score, higher is closer.
    pub score: f32,
}
