//! Vector index abstraction and backends.
//!
//! Entries are keyed by `document_id`, and queries are always scoped to a single
//! document: no result ever crosses a document boundary, including under concurrent
//! writes for other documents. Scoring uses cosine similarity with ties broken by
//! the unit's original insertion order. `k` is clamped to the number of available
//! entries; insufficient entries never produce an error.

mod memory;
mod qdrant;
mod types;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;
pub use types::{IndexEntry, IndexError, ScoredUnit};

use crate::config::{Config, IndexBackend};
use async_trait::async_trait;
use std::sync::Arc;

/// Interface implemented by vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace the entries stored for a document (last write wins).
    async fn upsert(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<(), IndexError>;

    /// Return up to `k` entries of `document_id` nearest to `vector`, best first.
    async fn query(
        &self,
        document_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredUnit>, IndexError>;

    /// Remove every entry owned by the document. Called at session end.
    async fn delete(&self, document_id: &str) -> Result<(), IndexError>;
}

/// Build the index backend selected by configuration.
pub async fn build_index(config: &Config) -> Result<Arc<dyn VectorIndex>, IndexError> {
    match config.index_backend {
        IndexBackend::Memory => Ok(Arc::new(MemoryIndex::new())),
        IndexBackend::Qdrant => {
            let index = QdrantIndex::from_config(config)?;
            index.ensure_collection().await?;
            Ok(Arc::new(index))
        }
    }
}

/// Cosine similarity between two vectors of equal length.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}
