//! Processing service coordinating extraction, chunking, embedding, and storage.

use crate::{
    config::get_config,
    embedding::{EmbeddingClient, EmbeddingType, get_embedding_client},
    metrics::{IngestMetrics, MetricsSnapshot},
    processing::{
        chunking::chunk_text,
        extract::TextExtractor,
        types::{IngestJob, PersistenceStatus, ProcessingError, ProcessingOutcome},
    },
    storage::{ChunkStore, StorageError, build_chunk_store},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs the per-document pipeline: extract, chunk, embed, persist.
///
/// The service owns long-lived handles to the extractor, embedding client, chunk store, and
/// metrics registry so the HTTP surface, the ingest queue, and the CLI share one pipeline.
/// Construct it once near process start and share it through an `Arc`.
pub struct ProcessingService {
    extractor: TextExtractor,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    store: Arc<dyn ChunkStore>,
    chunk_size: usize,
    chunk_overlap: usize,
    metrics: Arc<IngestMetrics>,
}

/// Abstraction over the processing pipeline used by external surfaces (HTTP, queue).
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Run the full pipeline for one stored document.
    async fn process(&self, job: IngestJob) -> Result<ProcessingOutcome, ProcessingError>;

    /// Whether the chunk store holds any chunk for `session_id`.
    async fn session_exists(&self, session_id: &str) -> Result<bool, StorageError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl ProcessingService {
    /// Build a service from the global configuration, preparing the chunk store.
    pub async fn new() -> Result<Self, StorageError> {
        let config = get_config();
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedding_client = get_embedding_client(config);
        let store = build_chunk_store(config).await?;
        tracing::info!(backend = ?config.storage_backend, "Chunk store ready");

        Ok(Self::with_components(
            TextExtractor::from_config(config),
            embedding_client,
            store,
            config.chunk_size,
            config.chunk_overlap,
        ))
    }

    /// Assemble a service from explicit parts.
    pub fn with_components(
        extractor: TextExtractor,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        store: Arc<dyn ChunkStore>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            extractor,
            embedding_client,
            store,
            chunk_size,
            chunk_overlap,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Extract, chunk, embed, and persist one document.
    ///
    /// Extraction, chunking, and embedding errors abort the run. A storage failure is logged,
    /// counted, and reported through [`PersistenceStatus::Failed`] while the run still succeeds.
    pub async fn process(&self, job: IngestJob) -> Result<ProcessingOutcome, ProcessingError> {
        let session_id = job.session_id.clone();
        let result = self.run_pipeline(job).await;
        if let Err(error) = &result {
            self.metrics.record_failure();
            tracing::error!(session_id = %session_id, error = %error, "Document processing failed");
        }
        result
    }

    async fn run_pipeline(&self, job: IngestJob) -> Result<ProcessingOutcome, ProcessingError> {
        let IngestJob {
            session_id,
            path,
            document_type,
        } = job;
        tracing::info!(
            session_id = %session_id,
            document = %path.display(),
            %document_type,
            "Processing document"
        );

        let extracted = self
            .extractor
            .extract_blocking(document_type, path.clone())
            .await?;
        let chunks = chunk_text(&extracted.text, self.chunk_size, self.chunk_overlap)?;
        tracing::debug!(
            session_id = %session_id,
            chars = extracted.text.chars().count(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "Chunked extracted text"
        );

        if chunks.is_empty() {
            tracing::warn!(
                session_id = %session_id,
                document = %path.display(),
                "Document produced no text; nothing to store"
            );
            self.metrics.record_document(0);
            return Ok(ProcessingOutcome {
                session_id,
                chunk_count: 0,
                page_count: extracted.page_count,
                persistence: PersistenceStatus::Skipped,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedding_client
            .generate_embeddings(texts, EmbeddingType::Document)
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(ProcessingError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let chunk_count = chunks.len();
        let persistence = match self
            .store
            .insert_document_chunks(&session_id, &path, &chunks, embeddings)
            .await
        {
            Ok(stored) => PersistenceStatus::Stored { chunks: stored },
            Err(error) => {
                self.metrics.record_persistence_failure();
                tracing::error!(
                    session_id = %session_id,
                    document = %path.display(),
                    chunks = chunk_count,
                    error = %error,
                    "Failed to store document chunks"
                );
                PersistenceStatus::Failed {
                    error: error.to_string(),
                }
            }
        };

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            session_id = %session_id,
            chunks = chunk_count,
            pages = ?extracted.page_count,
            persistence = ?persistence,
            "Document processed"
        );

        Ok(ProcessingOutcome {
            session_id,
            chunk_count,
            page_count: extracted.page_count,
            persistence,
        })
    }

    /// Whether the chunk store holds any chunk for `session_id`.
    pub async fn session_exists(&self, session_id: &str) -> Result<bool, StorageError> {
        self.store.session_exists(session_id).await
    }

    /// Return the current ingestion metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn process(&self, job: IngestJob) -> Result<ProcessingOutcome, ProcessingError> {
        ProcessingService::process(self, job).await
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool, StorageError> {
        ProcessingService::session_exists(self, session_id).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, HashingEmbeddingClient};
    use crate::processing::extract::OcrEngine;
    use crate::processing::fixtures::{pdf_with_pages, png_bytes};
    use crate::processing::types::{Chunk, DocumentType, ExtractionError};
    use crate::storage::InMemoryChunkStore;
    use std::path::{Path, PathBuf};
    use tempfile::{TempDir, tempdir};

    struct FixedOcr(&'static str);

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _path: &Path) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ChunkStore for FailingStore {
        async fn insert_document_chunks(
            &self,
            _session_id: &str,
            _document: &Path,
            _chunks: &[Chunk],
            _embeddings: Vec<Vec<f32>>,
        ) -> Result<usize, StorageError> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn session_exists(&self, _session_id: &str) -> Result<bool, StorageError> {
            Ok(false)
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingClient for ShortEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
            _embedding_type: EmbeddingType,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(vec![vec![1.0]])
        }
    }

    fn service_with(
        store: Arc<dyn ChunkStore>,
        client: Box<dyn EmbeddingClient + Send + Sync>,
        ocr_text: &'static str,
    ) -> ProcessingService {
        ProcessingService::with_components(
            TextExtractor::new(Arc::new(FixedOcr(ocr_text))),
            client,
            store,
            10,
            2,
        )
    }

    fn pdf_job(dir: &TempDir, session_id: &str, pages: &[&str]) -> IngestJob {
        let path = dir.path().join(format!("{session_id}.pdf"));
        std::fs::write(&path, pdf_with_pages(pages)).unwrap();
        IngestJob {
            session_id: session_id.to_string(),
            path,
            document_type: DocumentType::Pdf,
        }
    }

    #[tokio::test]
    async fn stores_every_chunk_under_the_session() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryChunkStore::new());
        let service = service_with(store.clone(), Box::new(HashingEmbeddingClient::new(8)), "");

        let outcome = service
            .process(pdf_job(&dir, "sess-a", &["Hello ", "World"]))
            .await
            .expect("pipeline");

        // "Hello  World" is 12 characters: windows at 0 and 8.
        assert_eq!(outcome.chunk_count, 2);
        assert_eq!(outcome.page_count, Some(2));
        assert_eq!(outcome.persistence, PersistenceStatus::Stored { chunks: 2 });

        let stored = store.chunks_for("sess-a");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].text, "Hello  Wor");
        assert_eq!(stored[1].text, "orld");
        assert!(stored.iter().all(|chunk| chunk.embedding.len() == 8));
        assert!(service.session_exists("sess-a").await.unwrap());

        let metrics = service.metrics_snapshot();
        assert_eq!(metrics.documents_processed, 1);
        assert_eq!(metrics.chunks_embedded, 2);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_but_not_fatal() {
        let dir = tempdir().unwrap();
        let service = service_with(
            Arc::new(FailingStore),
            Box::new(HashingEmbeddingClient::new(4)),
            "",
        );

        let outcome = service
            .process(pdf_job(&dir, "sess-b", &["Some text"]))
            .await
            .expect("run still succeeds");

        match outcome.persistence {
            PersistenceStatus::Failed { error } => assert!(error.contains("connection refused")),
            other => panic!("unexpected persistence status: {other:?}"),
        }
        let metrics = service.metrics_snapshot();
        assert_eq!(metrics.persistence_failures, 1);
        assert_eq!(metrics.documents_failed, 0);
    }

    #[tokio::test]
    async fn blank_image_skips_embedding_and_storage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.png");
        std::fs::write(&path, png_bytes(12, 12)).unwrap();
        let store = Arc::new(InMemoryChunkStore::new());
        // A zero-dimension hashing client errors on any call.
        let service = service_with(store.clone(), Box::new(HashingEmbeddingClient::new(0)), "   ");

        let outcome = service
            .process(IngestJob {
                session_id: "sess-c".into(),
                path,
                document_type: DocumentType::Image,
            })
            .await
            .expect("pipeline");

        assert_eq!(outcome.chunk_count, 0);
        assert_eq!(outcome.persistence, PersistenceStatus::Skipped);
        assert!(!store.session_exists("sess-c").await.unwrap());
    }

    #[tokio::test]
    async fn image_text_flows_through_ocr() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, png_bytes(12, 12)).unwrap();
        let store = Arc::new(InMemoryChunkStore::new());
        let service = service_with(
            store.clone(),
            Box::new(HashingEmbeddingClient::new(4)),
            "receipt",
        );

        let outcome = service
            .process(IngestJob {
                session_id: "sess-d".into(),
                path,
                document_type: DocumentType::Image,
            })
            .await
            .expect("pipeline");

        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(outcome.page_count, None);
        assert_eq!(store.chunks_for("sess-d")[0].text, "receipt");
    }

    #[tokio::test]
    async fn missing_document_aborts_and_counts_failure() {
        let store = Arc::new(InMemoryChunkStore::new());
        let service = service_with(store, Box::new(HashingEmbeddingClient::new(4)), "");

        let error = service
            .process(IngestJob {
                session_id: "sess-e".into(),
                path: PathBuf::from("/definitely/not/here.pdf"),
                document_type: DocumentType::Pdf,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ProcessingError::Extraction(ExtractionError::NotFound(_))
        ));
        assert_eq!(service.metrics_snapshot().documents_failed, 1);
    }

    #[tokio::test]
    async fn embedding_count_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemoryChunkStore::new());
        let service = service_with(store.clone(), Box::new(ShortEmbedder), "");

        let error = service
            .process(pdf_job(&dir, "sess-f", &["Hello ", "World"]))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ProcessingError::EmbeddingCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(!store.session_exists("sess-f").await.unwrap());
    }
}
