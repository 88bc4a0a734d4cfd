//! Embedding client abstraction and HTTP adapter.
//!
//! Each retrieval unit is embedded individually through the external embedding
//! service. The adapter validates the configured dimensionality on every vector so
//! that index writes never carry mismatched embeddings.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Service could not be reached or the call timed out.
    #[error("embedding service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Service responded with an error status.
    #[error("embedding request failed ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body could not be decoded.
    #[error("malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Returned vector length does not match configuration.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the index.
        expected: usize,
        /// Dimension actually produced by the service.
        actual: usize,
    },
}

impl EmbeddingError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::UnexpectedStatus { status, .. } => status.is_server_error(),
            Self::InvalidResponse(_) | Self::DimensionMismatch { .. } => false,
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Produce one embedding vector per supplied text, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimensionality of the vectors this backend produces.
    fn dimension(&self) -> usize;
}

/// HTTP adapter for the external embedding service.
pub struct HttpEmbedder {
    http: Client,
    base_url: String,
    dimension: usize,
    retry_limit: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    vector: Vec<f32>,
}

impl HttpEmbedder {
    /// Construct an adapter using configuration derived from the environment.
    pub fn new() -> Self {
        let config = get_config();
        Self::with_endpoint(
            config.embedding_url.clone(),
            config.embedding_dimension,
            config.embedding_timeout_secs,
            config.transient_retry_limit,
        )
    }

    /// Construct an adapter against an explicit endpoint.
    pub fn with_endpoint(
        base_url: String,
        dimension: usize,
        timeout_secs: u64,
        retry_limit: usize,
    ) -> Self {
        let http = Client::builder()
            .user_agent("medisum/embed")
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for embedding");
        Self {
            http,
            base_url,
            dimension,
            retry_limit,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embed", self.base_url.trim_end_matches('/'))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingError::ServiceUnavailable(format!(
                    "failed to reach embedding service at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let body: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingError::InvalidResponse(format!("failed to decode embedding response: {error}"))
        })?;

        if body.vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: body.vector.len(),
            });
        }

        Ok(body.vector)
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0;
        loop {
            match self.embed_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(error) if error.is_transient() && attempt < self.retry_limit => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %error, "Transient embedding failure; retrying");
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tracing::debug!(count = texts.len(), dimension = self.dimension, "Generating embeddings");
        let mut vectors = Vec::with_capacity(texts.len());
        // A failure for any unit aborts the batch; nothing partial is returned.
        for text in texts {
            vectors.push(self.embed_with_retry(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn embedder_for(server: &MockServer, dimension: usize) -> HttpEmbedder {
        HttpEmbedder::with_endpoint(server.base_url(), dimension, 5, 1)
    }

    #[tokio::test]
    async fn embed_returns_one_vector_per_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(200).json_body(json!({ "vector": [0.1, 0.2, 0.3] }));
            })
            .await;

        let vectors = embedder_for(&server, 3)
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .expect("vectors");

        mock.assert_hits(2);
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimension_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(200).json_body(json!({ "vector": [0.1, 0.2] }));
            })
            .await;

        let error = embedder_for(&server, 3)
            .embed(&["alpha".to_string()])
            .await
            .expect_err("dimension error");

        mock.assert_hits(1);
        assert!(matches!(
            error,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn embed_retries_transient_failures_once() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(500).body("boom");
            })
            .await;

        let error = embedder_for(&server, 3)
            .embed(&["alpha".to_string()])
            .await
            .expect_err("service error");

        mock.assert_hits(2);
        assert!(matches!(error, EmbeddingError::UnexpectedStatus { .. }));
    }
}
