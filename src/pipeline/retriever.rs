//! Audience-aware retrieval of supporting units.

use crate::embedding::{Embedder, EmbeddingError};
use crate::index::{IndexError, VectorIndex};
use crate::pipeline::prompts::seed_query;
use crate::pipeline::types::{RetrievalUnit, SummaryRequest};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while retrieving supporting units for a summary.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Seed query could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Index query failed at the storage layer.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Embedding service returned no vector for the seed query.
    #[error("embedding service returned no vector for the seed query")]
    EmptyEmbedding,
}

/// Queries the vector index with an audience-specific seed query.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    /// Build a retriever over the shared embedder and index handles.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    /// Return the units supporting one audience's summary, best first.
    ///
    /// `pool` is the request-scoped unit set the document produced; index hits
    /// are resolved against it. When `degraded` is set (text-only fallback),
    /// the whole pool is returned in original order without ranking.
    pub async fn retrieve(
        &self,
        request: &SummaryRequest,
        pool: &[RetrievalUnit],
        degraded: bool,
    ) -> Result<Vec<RetrievalUnit>, RetrievalError> {
        if degraded {
            tracing::debug!(
                document_id = %request.document_id,
                audience = %request.audience,
                "Text-only retrieval fallback; returning units unranked"
            );
            return Ok(pool.to_vec());
        }

        let seed = seed_query(request.audience);
        let mut vectors = self.embedder.embed(&[seed.to_string()]).await?;
        let vector = vectors.pop().ok_or(RetrievalError::EmptyEmbedding)?;

        let hits = self
            .index
            .query(&request.document_id, &vector, self.top_k)
            .await?;
        tracing::debug!(
            document_id = %request.document_id,
            audience = %request.audience,
            hits = hits.len(),
            "Retrieved supporting units"
        );

        let retrieved = hits
            .into_iter()
            .filter_map(|hit| {
                pool.iter()
                    .find(|unit| unit.unit_id == hit.unit_id)
                    .cloned()
            })
            .collect();
        Ok(retrieved)
    }
}
