use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    units_indexed: AtomicU64,
    summaries_generated: AtomicU64,
    failed_runs: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed document run and the number of units indexed for it.
    pub fn record_document(&self, unit_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.units_indexed.fetch_add(unit_count, Ordering::Relaxed);
    }

    /// Record a summary that was generated successfully.
    pub fn record_summary(&self) {
        self.summaries_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pipeline run that ended in a terminal failure.
    pub fn record_failure(&self) {
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            units_indexed: self.units_indexed.load(Ordering::Relaxed),
            summaries_generated: self.summaries_generated.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents that completed the pipeline since startup.
    pub documents_processed: u64,
    /// Total retrieval units written to the vector index.
    pub units_indexed: u64,
    /// Number of audience summaries generated successfully.
    pub summaries_generated: u64,
    /// Number of runs that ended in a terminal failure.
    pub failed_runs: u64,
}
