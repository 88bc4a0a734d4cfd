//! End-to-end pipeline tests over in-process component doubles.
//!
//! External services are replaced with deterministic stubs so the tests cover
//! orchestration behavior: stage sequencing, failure isolation, index hygiene,
//! and factual consistency between the two audience summaries.

use async_trait::async_trait;
use medisum::config::EmbeddingFailureMode;
use medisum::embedding::{Embedder, EmbeddingError};
use medisum::extraction::{ExtractionError, Extractor};
use medisum::generation::{GenerationError, Generator};
use medisum::index::MemoryIndex;
use medisum::pipeline::{
    ExtractedField, ExtractionRecord, PipelineOptions, PipelineService, PipelineStage,
    SourceFormat,
};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Extractor double returning a fixed record regardless of input bytes.
struct FixedExtractor {
    document_id: String,
    fields: Vec<(String, String)>,
    notes: Option<String>,
}

impl FixedExtractor {
    fn amoxicillin(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            fields: vec![
                ("medication".into(), "Amoxicillin".into()),
                ("dosage".into(), "500mg twice daily for 7 days".into()),
                ("diagnosis".into(), "Acute otitis media".into()),
            ],
            notes: Some("Take with food. Finish the full course.".into()),
        }
    }

    fn record(&self, format: SourceFormat) -> ExtractionRecord {
        ExtractionRecord {
            document_id: self.document_id.clone(),
            source_format: format,
            fields: self
                .fields
                .iter()
                .map(|(name, value)| ExtractedField {
                    name: name.clone(),
                    value: value.clone(),
                    confidence: None,
                })
                .collect(),
            raw_text: self.notes.clone(),
        }
    }
}

#[async_trait]
impl Extractor for FixedExtractor {
    async fn extract(
        &self,
        _document: &[u8],
        format: SourceFormat,
    ) -> Result<ExtractionRecord, ExtractionError> {
        Ok(self.record(format))
    }
}

/// Extractor double that always fails with a transient-looking error.
struct FailingExtractor;

#[async_trait]
impl Extractor for FailingExtractor {
    async fn extract(
        &self,
        _document: &[u8],
        _format: SourceFormat,
    ) -> Result<ExtractionRecord, ExtractionError> {
        Err(ExtractionError::ServiceUnavailable("connection refused".into()))
    }
}

/// Deterministic embedder: the vector is a pure function of the text bytes.
struct HashEmbedder;

fn text_vector(text: &str) -> Vec<f32> {
    let bytes = text.as_bytes();
    let sum: u32 = bytes.iter().map(|b| u32::from(*b)).sum();
    vec![
        (bytes.len() % 97) as f32 + 1.0,
        (sum % 89) as f32 + 1.0,
        (u32::from(bytes.first().copied().unwrap_or(1)) % 83) as f32 + 1.0,
    ]
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| text_vector(text)).collect())
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Embedder double that always fails.
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ServiceUnavailable("timeout".into()))
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Generator double echoing the factual block of the prompt, so the produced
/// "summary" contains exactly the facts the prompt carried.
struct EchoGenerator {
    fail_doctor: bool,
}

impl EchoGenerator {
    fn new() -> Self {
        Self { fail_doctor: false }
    }

    fn failing_for_doctor() -> Self {
        Self { fail_doctor: true }
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if self.fail_doctor && prompt.contains("helping doctors") {
            return Err(GenerationError::ServiceUnavailable("timeout".into()));
        }
        let facts = prompt
            .split("Extracted prescription data:")
            .nth(1)
            .unwrap_or(prompt);
        // Drop the supporting-context block so the echoed text carries only
        // the record's facts, mirroring a generator that obeys its prompt.
        let facts = facts.split("\nSupporting context").next().unwrap_or(facts);
        Ok(format!("Summary of the prescription:{facts}"))
    }
}

fn options() -> PipelineOptions {
    PipelineOptions {
        note_chunk_tokens: 120,
        retrieval_top_k: 8,
        embedding_failure_mode: EmbeddingFailureMode::Fail,
    }
}

fn service_with(
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: Arc<MemoryIndex>,
    options: PipelineOptions,
) -> PipelineService {
    PipelineService::with_components(extractor, embedder, generator, index, options)
}

fn numbers_in(text: &str) -> BTreeSet<String> {
    let pattern = Regex::new(r"\d+(?:\.\d+)?").expect("valid regex");
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[tokio::test]
async fn full_run_produces_both_summaries() {
    let index = Arc::new(MemoryIndex::new());
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        index.clone(),
        options(),
    );

    let outcome = service
        .run(b"%PDF-1.4 fake prescription", SourceFormat::Pdf)
        .await
        .expect("pipeline run");

    assert_eq!(outcome.document_id, "doc-amox");
    assert!(!outcome.degraded);
    let doctor = outcome.doctor.expect("doctor summary");
    let patient = outcome.patient.expect("patient summary");
    assert!(doctor.text.contains("Amoxicillin"));
    assert!(patient.text.contains("Amoxicillin"));
    assert!(doctor.text.contains("500mg twice daily"));
    assert!(!doctor.supporting_units.is_empty());
    assert!(!patient.supporting_units.is_empty());
    // Three fields plus one note chunk committed.
    assert_eq!(index.entry_count("doc-amox").await, 4);
}

#[tokio::test]
async fn audience_summaries_agree_on_every_number() {
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        Arc::new(MemoryIndex::new()),
        options(),
    );

    let outcome = service
        .run(b"scan bytes", SourceFormat::Image)
        .await
        .expect("pipeline run");
    let doctor = outcome.doctor.expect("doctor summary");
    let patient = outcome.patient.expect("patient summary");

    let doctor_numbers = numbers_in(&doctor.text);
    let patient_numbers = numbers_in(&patient.text);
    assert_eq!(doctor_numbers, patient_numbers);
    assert!(doctor_numbers.contains("500"));
    assert!(doctor_numbers.contains("7"));

    // No number in either summary is absent from the extraction record.
    let record_text: String = outcome
        .record
        .fields
        .iter()
        .map(|field| field.value.clone())
        .chain(outcome.record.raw_text.clone())
        .collect::<Vec<_>>()
        .join(" ");
    let record_numbers = numbers_in(&record_text);
    assert!(doctor_numbers.is_subset(&record_numbers));
}

#[tokio::test]
async fn extraction_failure_aborts_before_any_index_write() {
    let index = Arc::new(MemoryIndex::new());
    let service = service_with(
        Arc::new(FailingExtractor),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        index.clone(),
        options(),
    );

    let error = service
        .run(b"bytes", SourceFormat::Image)
        .await
        .expect_err("extraction failure");
    assert_eq!(error.stage, PipelineStage::Extracting);
    assert_eq!(index.entry_count("doc-amox").await, 0);
}

#[tokio::test]
async fn empty_document_is_rejected_on_receipt() {
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        Arc::new(MemoryIndex::new()),
        options(),
    );

    let error = service
        .run(b"", SourceFormat::Pdf)
        .await
        .expect_err("validation failure");
    assert_eq!(error.stage, PipelineStage::Received);
}

#[tokio::test]
async fn failed_doctor_branch_leaves_patient_summary_intact() {
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::failing_for_doctor()),
        Arc::new(MemoryIndex::new()),
        options(),
    );

    let outcome = service
        .run(b"bytes", SourceFormat::Pdf)
        .await
        .expect("run completes despite branch failure");
    assert!(outcome.doctor.is_err());
    let patient = outcome.patient.expect("patient summary");
    assert!(patient.text.contains("Amoxicillin"));
}

#[tokio::test]
async fn documents_are_isolated_in_the_shared_index() {
    let index = Arc::new(MemoryIndex::new());
    let first = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-a")),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        index.clone(),
        options(),
    );
    let second = service_with(
        Arc::new(FixedExtractor {
            document_id: "doc-b".into(),
            fields: vec![
                ("medication".into(), "Ibuprofen".into()),
                ("dosage".into(), "200mg as needed".into()),
            ],
            notes: None,
        }),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        index.clone(),
        options(),
    );

    first.run(b"a", SourceFormat::Pdf).await.expect("first run");
    second.run(b"b", SourceFormat::Pdf).await.expect("second run");

    assert_eq!(index.entry_count("doc-a").await, 4);
    assert_eq!(index.entry_count("doc-b").await, 2);

    let outcome = second.run(b"b", SourceFormat::Pdf).await.expect("rerun");
    let doctor = outcome.doctor.expect("doctor summary");
    assert!(doctor.text.contains("Ibuprofen"));
    assert!(!doctor.text.contains("Amoxicillin"));
}

#[tokio::test]
async fn repeated_runs_retrieve_identical_support() {
    let index = Arc::new(MemoryIndex::new());
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(HashEmbedder),
        Arc::new(EchoGenerator::new()),
        index,
        options(),
    );

    let first = service
        .run(b"bytes", SourceFormat::Pdf)
        .await
        .expect("first run");
    let second = service
        .run(b"bytes", SourceFormat::Pdf)
        .await
        .expect("second run");

    let first_units = first.doctor.expect("doctor summary").supporting_units;
    let second_units = second.doctor.expect("doctor summary").supporting_units;
    assert_eq!(first_units, second_units);
}

#[tokio::test]
async fn embedding_failure_aborts_run_in_strict_mode() {
    let index = Arc::new(MemoryIndex::new());
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(FailingEmbedder),
        Arc::new(EchoGenerator::new()),
        index.clone(),
        options(),
    );

    let error = service
        .run(b"bytes", SourceFormat::Pdf)
        .await
        .expect_err("strict mode fails the run");
    assert_eq!(error.stage, PipelineStage::Indexing);
    assert_eq!(index.entry_count("doc-amox").await, 0);
}

#[tokio::test]
async fn embedding_failure_degrades_to_text_only_when_configured() {
    let index = Arc::new(MemoryIndex::new());
    let service = service_with(
        Arc::new(FixedExtractor::amoxicillin("doc-amox")),
        Arc::new(FailingEmbedder),
        Arc::new(EchoGenerator::new()),
        index.clone(),
        PipelineOptions {
            embedding_failure_mode: EmbeddingFailureMode::TextOnly,
            ..options()
        },
    );

    let outcome = service
        .run(b"bytes", SourceFormat::Pdf)
        .await
        .expect("degraded run completes");
    assert!(outcome.degraded);
    assert_eq!(index.entry_count("doc-amox").await, 0);

    // The full unit pool backs both summaries, in document order.
    let doctor = outcome.doctor.expect("doctor summary");
    assert_eq!(
        doctor.supporting_units,
        vec!["medication-0", "dosage-1", "diagnosis-2", "note-3"]
    );
}
