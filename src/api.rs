//! HTTP surface for the prescription summarization pipeline.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /prescriptions` – Submit a base64-encoded prescription document
//!   (image or PDF), run the full pipeline, and return both audience summaries.
//! - `GET /prescriptions/:id` – Fetch the stored record for a processed
//!   document, including its summaries and per-audience errors.
//! - `DELETE /prescriptions/:id` – End a document's session: prune its index
//!   entries and drop its bookkeeping record.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /health` – Liveness probe.

use crate::index::IndexError;
use crate::pipeline::{PipelineApi, PipelineError, SourceFormat, ValidationError};
use crate::store::{BookkeepingStore, DocumentRecord};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Shared state behind every route: the pipeline and the bookkeeping store.
pub struct ApiState<S> {
    /// Pipeline implementation serving the routes.
    pub service: Arc<S>,
    /// Record store for processed documents.
    pub store: Arc<BookkeepingStore>,
}

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    let state = Arc::new(ApiState {
        service,
        store: Arc::new(BookkeepingStore::new()),
    });
    Router::new()
        .route("/prescriptions", post(submit_prescription::<S>))
        .route(
            "/prescriptions/:id",
            get(get_prescription::<S>).delete(delete_prescription::<S>),
        )
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(health))
        .with_state(state)
}

/// Request body for `POST /prescriptions`.
#[derive(Deserialize)]
struct SubmitRequest {
    /// Base64-encoded document bytes.
    data: String,
    /// MIME type of the document (`image/png`, `image/jpeg`, `application/pdf`).
    mime_type: String,
}

/// Submit a prescription document and run the full pipeline.
///
/// Format and emptiness are validated before any external service is called.
/// The response carries the bookkeeping record: one summary per audience, with
/// per-audience error markers when a branch failed.
async fn submit_prescription<S>(
    State(state): State<Arc<ApiState<S>>>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<DocumentRecord>), AppError>
where
    S: PipelineApi,
{
    let format = SourceFormat::from_mime(&request.mime_type)?;
    let document = BASE64
        .decode(request.data.as_bytes())
        .map_err(|error| AppError::BadRequest(format!("invalid base64 payload: {error}")))?;

    let outcome = state.service.run(&document, format).await?;
    let record = DocumentRecord::from_outcome(&outcome);
    tracing::info!(
        document_id = %record.document_id,
        status = ?record.status,
        degraded = outcome.degraded,
        "Prescription processed"
    );
    state.store.upsert(record.clone()).await;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Fetch the stored record for a processed document.
async fn get_prescription<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentRecord>, AppError>
where
    S: PipelineApi,
{
    match state.store.get(&id).await {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(id)),
    }
}

/// End a document's session: prune index entries and drop the record.
async fn delete_prescription<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: PipelineApi,
{
    let existed = state.store.remove(&id).await;
    state.service.end_session(&id).await?;
    if existed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(id))
    }
}

/// Return the current pipeline counters.
async fn get_metrics<S>(State(state): State<Arc<ApiState<S>>>) -> Response
where
    S: PipelineApi,
{
    Json(state.service.metrics_snapshot()).into_response()
}

/// Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Route-level error with an HTTP mapping.
enum AppError {
    /// Malformed request: bad base64, unsupported format, empty document.
    BadRequest(String),
    /// No record exists for the requested document.
    NotFound(String),
    /// The pipeline failed before producing summaries.
    Pipeline(PipelineError),
    /// The index backend failed while ending a session.
    Index(IndexError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(id) => (StatusCode::NOT_FOUND, format!("no record for document {id}")),
            Self::Pipeline(error) => (StatusCode::BAD_GATEWAY, error.to_string()),
            Self::Index(error) => (StatusCode::BAD_GATEWAY, error.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(inner: ValidationError) -> Self {
        Self::BadRequest(inner.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<IndexError> for AppError {
    fn from(inner: IndexError) -> Self {
        Self::Index(inner)
    }
}
