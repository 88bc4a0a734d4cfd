//! Extraction adapter for the external multimodal model.
//!
//! The adapter forwards document bytes to the extraction service together with a fixed
//! schema and parses the structured response into an [`ExtractionRecord`]. Transient
//! transport failures get one bounded retry; schema and parse failures are permanent.

use crate::config::get_config;
use crate::pipeline::{ExtractedField, ExtractionRecord, SourceFormat};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced while extracting structured data from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Service could not be reached or the call timed out.
    #[error("extraction service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Service responded with an error status.
    #[error("extraction request failed ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response did not match the expected extraction schema.
    #[error("malformed extraction response: {0}")]
    InvalidResponse(String),
}

impl ExtractionError {
    /// Whether the failure is worth one bounded retry.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) => true,
            Self::UnexpectedStatus { status, .. } => status.is_server_error(),
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Interface implemented by document extraction backends.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract a structured record from raw document bytes.
    async fn extract(
        &self,
        document: &[u8],
        format: SourceFormat,
    ) -> Result<ExtractionRecord, ExtractionError>;
}

/// HTTP adapter for the multimodal extraction service.
pub struct HttpExtractor {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    retry_limit: usize,
}

/// Structured response contract of the extraction service.
#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    medications: Vec<String>,
    dosages: Vec<String>,
    diagnoses: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl HttpExtractor {
    /// Construct an adapter using configuration derived from the environment.
    pub fn new() -> Self {
        let config = get_config();
        Self::with_endpoint(
            config.extraction_url.clone(),
            config.extraction_api_key.clone(),
            config.extraction_timeout_secs,
            config.transient_retry_limit,
        )
    }

    /// Construct an adapter against an explicit endpoint.
    pub fn with_endpoint(
        base_url: String,
        api_key: Option<String>,
        timeout_secs: u64,
        retry_limit: usize,
    ) -> Self {
        let http = Client::builder()
            .user_agent("medisum/extract")
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to construct reqwest::Client for extraction");
        Self {
            http,
            base_url,
            api_key,
            retry_limit,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/extract", self.base_url.trim_end_matches('/'))
    }

    async fn call_once(
        &self,
        document: &[u8],
        format: SourceFormat,
    ) -> Result<ExtractionResponse, ExtractionError> {
        let payload = json!({
            "data": BASE64.encode(document),
            "mime_type": format.mime_type(),
        });

        let mut request = self.http.post(self.endpoint()).json(&payload);
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.header("api-key", api_key);
        }

        let response = request.send().await.map_err(|error| {
            ExtractionError::ServiceUnavailable(format!(
                "failed to reach extraction service at {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::UnexpectedStatus { status, body });
        }

        response.json().await.map_err(|error| {
            ExtractionError::InvalidResponse(format!(
                "failed to decode extraction response: {error}"
            ))
        })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        document: &[u8],
        format: SourceFormat,
    ) -> Result<ExtractionRecord, ExtractionError> {
        let mut attempt = 0;
        let parsed = loop {
            match self.call_once(document, format).await {
                Ok(parsed) => break parsed,
                Err(error) if error.is_transient() && attempt < self.retry_limit => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %error,
                        "Transient extraction failure; retrying"
                    );
                }
                Err(error) => return Err(error),
            }
        };

        Ok(record_from_response(parsed, format))
    }
}

/// Map the service response into an immutable extraction record.
fn record_from_response(response: ExtractionResponse, format: SourceFormat) -> ExtractionRecord {
    let ExtractionResponse {
        medications,
        dosages,
        diagnoses,
        notes,
    } = response;

    let mut fields = Vec::with_capacity(medications.len() + dosages.len() + diagnoses.len());
    append_fields(&mut fields, "medication", medications);
    append_fields(&mut fields, "dosage", dosages);
    append_fields(&mut fields, "diagnosis", diagnoses);

    ExtractionRecord {
        document_id: Uuid::new_v4().to_string(),
        source_format: format,
        fields,
        raw_text: notes.and_then(|text| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }),
    }
}

fn append_fields(fields: &mut Vec<ExtractedField>, name: &str, values: Vec<String>) {
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        fields.push(ExtractedField {
            name: name.to_string(),
            value: trimmed.to_string(),
            confidence: None,
        });
    }
}
