//! Pipeline orchestrator sequencing extraction, indexing, retrieval, and generation.

use crate::{
    config::{Config, EmbeddingFailureMode, get_config},
    embedding::{Embedder, HttpEmbedder},
    extraction::{Extractor, HttpExtractor},
    generation::{Generator, HttpGenerator},
    index::{IndexEntry, IndexError, VectorIndex, build_index},
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::{
        chunking::units_from_record,
        prompts::build_prompt,
        retriever::Retriever,
        types::{
            Audience, ExtractionRecord, PipelineError, PipelineOutcome, PipelineStage,
            RetrievalUnit, SourceFormat, StageFailure, Summary, SummaryError, SummaryRequest,
            ValidationError, current_timestamp_rfc3339,
        },
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Tunable knobs for one pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Maximum token budget per free-text note chunk.
    pub note_chunk_tokens: usize,
    /// Number of units requested from the index per retrieval.
    pub retrieval_top_k: usize,
    /// Behavior when the embedding step fails for a document.
    pub embedding_failure_mode: EmbeddingFailureMode,
}

impl PipelineOptions {
    /// Derive options from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            note_chunk_tokens: config.note_chunk_tokens,
            retrieval_top_k: config.retrieval_top_k,
            embedding_failure_mode: config.embedding_failure_mode,
        }
    }
}

/// Abstraction over the pipeline used by external surfaces (HTTP, tests).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Run the full pipeline for one uploaded document.
    async fn run(
        &self,
        document: &[u8],
        format: SourceFormat,
    ) -> Result<PipelineOutcome, PipelineError>;

    /// End a document's session: prune its index entries.
    async fn end_session(&self, document_id: &str) -> Result<(), IndexError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates the full run: extraction, chunking, embedding, index writes,
/// retrieval, and the two audience summary branches.
///
/// The service owns long-lived handles to the external-service adapters and the
/// vector index so that every request reuses the same components. Construct it
/// once near process start and share it through an `Arc`.
pub struct PipelineService {
    extractor: Arc<dyn Extractor>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    metrics: Arc<PipelineMetrics>,
    options: PipelineOptions,
}

impl PipelineService {
    /// Build a service from loaded configuration, initializing the index backend.
    pub async fn new() -> Result<Self, IndexError> {
        let config = get_config();
        tracing::info!("Initializing pipeline components");
        let index = build_index(config).await?;
        let service = Self::with_components(
            Arc::new(HttpExtractor::new()),
            Arc::new(HttpEmbedder::new()),
            Arc::new(HttpGenerator::new()),
            index,
            PipelineOptions::from_config(config),
        );
        tracing::info!("Pipeline components initialized");
        Ok(service)
    }

    /// Build a service from explicit components. Used by surfaces that inject
    /// test doubles for the external services.
    pub fn with_components(
        extractor: Arc<dyn Extractor>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Arc<dyn VectorIndex>,
        options: PipelineOptions,
    ) -> Self {
        let retriever = Retriever::new(embedder.clone(), index.clone(), options.retrieval_top_k);
        Self {
            extractor,
            embedder,
            generator,
            index,
            retriever,
            metrics: Arc::new(PipelineMetrics::new()),
            options,
        }
    }

    /// Run the full pipeline for one uploaded document.
    ///
    /// Extraction and indexing are single points of failure; afterwards the two
    /// audience branches run concurrently and fail independently.
    pub async fn run(
        &self,
        document: &[u8],
        format: SourceFormat,
    ) -> Result<PipelineOutcome, PipelineError> {
        tracing::debug!(bytes = document.len(), ?format, stage = %PipelineStage::Received, "Document received");
        if document.is_empty() {
            return Err(self.fail(PipelineStage::Received, ValidationError::EmptyDocument.into()));
        }

        tracing::debug!(stage = %PipelineStage::Extracting, "Extracting structured data");
        let record = self
            .extractor
            .extract(document, format)
            .await
            .map_err(|error| self.fail(PipelineStage::Extracting, error.into()))?;
        tracing::info!(
            document_id = %record.document_id,
            fields = record.fields.len(),
            stage = %PipelineStage::Extracted,
            "Extraction complete"
        );

        let (units, degraded) = self.index_document(&record).await?;
        tracing::info!(
            document_id = %record.document_id,
            units = units.len(),
            degraded,
            stage = %PipelineStage::Indexed,
            "Document indexed"
        );

        // Both branches share only read-only inputs; run them concurrently.
        let (doctor, patient) = tokio::join!(
            self.summarize(Audience::Doctor, &record, &units, degraded),
            self.summarize(Audience::Patient, &record, &units, degraded),
        );

        self.metrics.record_document(units.len() as u64);
        tracing::info!(
            document_id = %record.document_id,
            doctor_ok = doctor.is_ok(),
            patient_ok = patient.is_ok(),
            stage = %PipelineStage::Done,
            "Pipeline run complete"
        );

        Ok(PipelineOutcome {
            document_id: record.document_id.clone(),
            record,
            doctor,
            patient,
            degraded,
        })
    }

    /// Chunk, embed, and commit the record's units to the index.
    ///
    /// Returns the request-scoped unit pool and whether retrieval degraded to
    /// text-only mode. No partial index state is ever committed: the upsert
    /// happens once, after the whole batch has embedded.
    async fn index_document(
        &self,
        record: &ExtractionRecord,
    ) -> Result<(Vec<RetrievalUnit>, bool), PipelineError> {
        tracing::debug!(document_id = %record.document_id, stage = %PipelineStage::Indexing, "Deriving retrieval units");
        let mut units = units_from_record(record, self.options.note_chunk_tokens)
            .map_err(|error| self.fail(PipelineStage::Indexing, error.into()))?;

        if units.is_empty() {
            return Ok((units, false));
        }

        let texts: Vec<String> = units.iter().map(|unit| unit.text.clone()).collect();
        let vectors = match self.embedder.embed(&texts).await {
            Ok(vectors) => vectors,
            Err(error) => {
                return match self.options.embedding_failure_mode {
                    EmbeddingFailureMode::Fail => {
                        Err(self.fail(PipelineStage::Indexing, error.into()))
                    }
                    EmbeddingFailureMode::TextOnly => {
                        tracing::warn!(
                            document_id = %record.document_id,
                            error = %error,
                            "Embedding degraded; continuing with text-only retrieval"
                        );
                        Ok((units, true))
                    }
                };
            }
        };

        debug_assert_eq!(units.len(), vectors.len());
        let entries: Vec<IndexEntry> = units
            .iter_mut()
            .zip(vectors.into_iter())
            .map(|(unit, vector)| {
                unit.embedding = Some(vector.clone());
                IndexEntry {
                    unit_id: unit.unit_id.clone(),
                    ordinal: unit.ordinal,
                    text: unit.text.clone(),
                    source_field: unit.source_field.clone(),
                    vector,
                }
            })
            .collect();

        self.index
            .upsert(&record.document_id, entries)
            .await
            .map_err(|error| self.fail(PipelineStage::Indexing, error.into()))?;

        Ok((units, false))
    }

    /// Run one audience branch: retrieve support, build the prompt, generate.
    async fn summarize(
        &self,
        audience: Audience,
        record: &ExtractionRecord,
        pool: &[RetrievalUnit],
        degraded: bool,
    ) -> Result<Summary, SummaryError> {
        tracing::debug!(
            document_id = %record.document_id,
            stage = %PipelineStage::Summarizing(audience),
            "Generating summary"
        );
        let request = SummaryRequest {
            document_id: record.document_id.clone(),
            audience,
        };
        let retrieved = self.retriever.retrieve(&request, pool, degraded).await?;
        let prompt = build_prompt(audience, record, &retrieved);
        let text = self.generator.generate(&prompt).await.map_err(|error| {
            tracing::warn!(
                document_id = %record.document_id,
                audience = %audience,
                error = %error,
                "Summary branch failed"
            );
            SummaryError::from(error)
        })?;

        self.metrics.record_summary();
        Ok(Summary {
            audience,
            text,
            supporting_units: retrieved.into_iter().map(|unit| unit.unit_id).collect(),
            generated_at: current_timestamp_rfc3339(),
        })
    }

    fn fail(&self, stage: PipelineStage, source: StageFailure) -> PipelineError {
        self.metrics.record_failure();
        let error = PipelineError { stage, source };
        tracing::error!(error = %error, "Pipeline run failed");
        error
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl PipelineApi for PipelineService {
    async fn run(
        &self,
        document: &[u8],
        format: SourceFormat,
    ) -> Result<PipelineOutcome, PipelineError> {
        PipelineService::run(self, document, format).await
    }

    async fn end_session(&self, document_id: &str) -> Result<(), IndexError> {
        self.index.delete(document_id).await?;
        tracing::info!(document_id, "Document session ended");
        Ok(())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        PipelineService::metrics_snapshot(self)
    }
}
