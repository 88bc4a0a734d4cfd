//! Bookkeeping store for processed documents.
//!
//! A simple key-value record per document, holding the run status and the final
//! summaries for later retrieval. Records are removed when the document's
//! session ends.

use crate::pipeline::{PipelineOutcome, Summary};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Terminal status of a pipeline run as recorded for later retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Both audience summaries were generated.
    Completed,
    /// Exactly one audience branch failed.
    PartiallyCompleted,
    /// Both audience branches failed.
    Failed,
}

/// Bookkeeping record kept per document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    /// Identifier of the processed document.
    pub document_id: String,
    /// Terminal status of the run.
    pub status: DocumentStatus,
    /// Clinician-facing summary, when its branch succeeded.
    pub doctor_summary: Option<Summary>,
    /// Patient-facing summary, when its branch succeeded.
    pub patient_summary: Option<Summary>,
    /// Error marker for the doctor branch, when it failed.
    pub doctor_error: Option<String>,
    /// Error marker for the patient branch, when it failed.
    pub patient_error: Option<String>,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}

impl DocumentRecord {
    /// Build a bookkeeping record from a completed pipeline run.
    pub fn from_outcome(outcome: &PipelineOutcome) -> Self {
        let status = match (&outcome.doctor, &outcome.patient) {
            (Ok(_), Ok(_)) => DocumentStatus::Completed,
            (Err(_), Err(_)) => DocumentStatus::Failed,
            _ => DocumentStatus::PartiallyCompleted,
        };

        Self {
            document_id: outcome.document_id.clone(),
            status,
            doctor_summary: outcome.doctor.as_ref().ok().cloned(),
            patient_summary: outcome.patient.as_ref().ok().cloned(),
            doctor_error: outcome.doctor.as_ref().err().map(ToString::to_string),
            patient_error: outcome.patient.as_ref().err().map(ToString::to_string),
            updated_at: crate::pipeline::current_timestamp_rfc3339(),
        }
    }
}

/// In-process key-value store of document records.
#[derive(Default)]
pub struct BookkeepingStore {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl BookkeepingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for a document.
    pub async fn upsert(&self, record: DocumentRecord) {
        let mut records = self.records.write().await;
        records.insert(record.document_id.clone(), record);
    }

    /// Fetch the record for a document, if present.
    pub async fn get(&self, document_id: &str) -> Option<DocumentRecord> {
        self.records.read().await.get(document_id).cloned()
    }

    /// Remove the record for a document. Returns whether a record existed.
    pub async fn remove(&self, document_id: &str) -> bool {
        self.records.write().await.remove(document_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{
        Audience, ExtractionRecord, PipelineOutcome, SourceFormat, Summary, SummaryError,
    };
    use crate::generation::GenerationError;

    fn summary(audience: Audience) -> Summary {
        Summary {
            audience,
            text: "text".into(),
            supporting_units: vec![],
            generated_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn outcome(
        doctor: Result<Summary, SummaryError>,
        patient: Result<Summary, SummaryError>,
    ) -> PipelineOutcome {
        PipelineOutcome {
            document_id: "doc-a".into(),
            record: ExtractionRecord {
                document_id: "doc-a".into(),
                source_format: SourceFormat::Pdf,
                fields: vec![],
                raw_text: None,
            },
            doctor,
            patient,
            degraded: false,
        }
    }

    fn branch_error() -> SummaryError {
        SummaryError::Generation(GenerationError::InvalidResponse("empty".into()))
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let store = BookkeepingStore::new();
        let record = DocumentRecord::from_outcome(&outcome(
            Ok(summary(Audience::Doctor)),
            Ok(summary(Audience::Patient)),
        ));
        store.upsert(record).await;

        let fetched = store.get("doc-a").await.expect("record");
        assert_eq!(fetched.status, DocumentStatus::Completed);
        assert!(fetched.doctor_summary.is_some());
        assert!(fetched.doctor_error.is_none());
    }

    #[tokio::test]
    async fn partial_failure_is_recorded_per_audience() {
        let record =
            DocumentRecord::from_outcome(&outcome(Err(branch_error()), Ok(summary(Audience::Patient))));
        assert_eq!(record.status, DocumentStatus::PartiallyCompleted);
        assert!(record.doctor_summary.is_none());
        assert!(record.doctor_error.is_some());
        assert!(record.patient_summary.is_some());
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = BookkeepingStore::new();
        assert!(!store.remove("missing").await);
        store
            .upsert(DocumentRecord::from_outcome(&outcome(
                Ok(summary(Audience::Doctor)),
                Ok(summary(Audience::Patient)),
            )))
            .await;
        assert!(store.remove("doc-a").await);
        assert!(store.get("doc-a").await.is_none());
    }
}
