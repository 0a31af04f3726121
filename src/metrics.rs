use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    documents_processed: AtomicU64,
    chunks_embedded: AtomicU64,
    documents_failed: AtomicU64,
    persistence_failures: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pipeline run that reached the persistence step.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_embedded
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a pipeline run aborted by an extraction, chunking, or embedding error.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a storage write that failed after embeddings were produced.
    pub fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_embedded: self.chunks_embedded.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents whose pipeline completed since startup.
    pub documents_processed: u64,
    /// Chunks embedded across all completed documents.
    pub chunks_embedded: u64,
    /// Documents whose pipeline aborted with an error.
    pub documents_failed: u64,
    /// Completed documents whose chunks could not be stored.
    pub persistence_failures: u64,
}
