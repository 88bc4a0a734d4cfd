//! Generation client abstraction and HTTP adapter.
//!
//! The summary generator posts an assembled prompt to the external language model
//! and returns the generated text. Transient failures get one bounded retry; a
//! failed generation stays scoped to its audience branch.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while generating summary text.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Service could not be reached or the call timed out.
    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Service responded with an error status.
    #[error("generation request failed ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body could not be decoded or carried no text.
    #[error("malformed generation response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::UnexpectedStatus { status, .. } => status.is_server_error(),
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Interface implemented by text generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for the supplied prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// HTTP adapter for the external generation service.
pub struct HttpGenerator {
    http: Client,
    base_url: String,
    retry_limit: usize,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    text: String,
}

impl HttpGenerator {
    /// Construct an adapter using configuration derived from the environment.
    pub fn new() -> Self {
        let config = get_config();
        Self::with_endpoint(
            config.generation_url.clone(),
            config.generation_timeout_secs,
            config.transient_retry_limit,
        )
    }

    /// Construct an adapter against an explicit endpoint.
    pub fn with_endpoint(base_url: String, timeout_secs: u64, retry_limit: usize) -> Self {
        let http = Client::builder()
            .user_agent("medisum/generate")
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for generation");
        Self {
            http,
            base_url,
            retry_limit,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/generate", self.base_url.trim_end_matches('/'))
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|error| {
                GenerationError::ServiceUnavailable(format!(
                    "failed to reach generation service at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::UnexpectedStatus { status, body });
        }

        let body: GenerationResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!(
                "failed to decode generation response: {error}"
            ))
        })?;

        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "generation service returned empty text".into(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut attempt = 0;
        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_transient() && attempt < self.retry_limit => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %error,
                        "Transient generation failure; retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}
