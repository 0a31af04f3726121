//! Persistence contract for embedded chunks and backend selection.

mod memory;

use crate::config::{Config, StorageBackend};
use crate::processing::types::Chunk;
use crate::qdrant::{QdrantError, QdrantService};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use memory::{InMemoryChunkStore, StoredChunk};

/// Errors raised by chunk store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Qdrant rejected or failed the request.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Chunks and embeddings are not positionally aligned.
    #[error("Chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of embeddings supplied.
        embeddings: usize,
    },
    /// Backend refused the write for another reason.
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Storage for embedded chunks keyed by session identifier.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist `chunks` with their aligned `embeddings` under `session_id`.
    ///
    /// Returns the number of chunks written.
    async fn insert_document_chunks(
        &self,
        session_id: &str,
        document: &Path,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, StorageError>;

    /// Whether any chunk has been stored for `session_id`.
    async fn session_exists(&self, session_id: &str) -> Result<bool, StorageError>;
}

pub(crate) fn ensure_aligned(
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
) -> Result<(), StorageError> {
    if chunks.len() != embeddings.len() {
        return Err(StorageError::LengthMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }
    Ok(())
}

/// Build the configured chunk store, preparing remote collections when needed.
pub async fn build_chunk_store(config: &Config) -> Result<Arc<dyn ChunkStore>, StorageError> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory chunk store; stored chunks are lost on restart");
            Ok(Arc::new(InMemoryChunkStore::new()))
        }
        StorageBackend::Qdrant => {
            let service = QdrantService::from_config(config)?;
            service
                .prepare_collection(config.embedding_dimension as u64)
                .await?;
            Ok(Arc::new(service))
        }
    }
}
