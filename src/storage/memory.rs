//! Process-local chunk store.

use super::{ChunkStore, StorageError, ensure_aligned};
use crate::processing::types::Chunk;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// One persisted chunk held by [`InMemoryChunkStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    /// Document the chunk was read from.
    pub document: PathBuf,
    /// Position of the chunk in its document.
    pub chunk_index: usize,
    /// Chunk contents.
    pub text: String,
    /// Embedding vector for the chunk.
    pub embedding: Vec<f32>,
}

/// Chunk store backed by a concurrent map; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    sessions: DashMap<String, Vec<StoredChunk>>,
}

impl InMemoryChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the chunks stored for `session_id`, in insertion order.
    pub fn chunks_for(&self, session_id: &str) -> Vec<StoredChunk> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn insert_document_chunks(
        &self,
        session_id: &str,
        document: &Path,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, StorageError> {
        ensure_aligned(chunks, &embeddings)?;

        let stored: Vec<StoredChunk> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredChunk {
                document: document.to_path_buf(),
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                embedding,
            })
            .collect();
        let count = stored.len();

        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .extend(stored);
        tracing::debug!(session_id, chunks = count, "Chunks stored in memory");
        Ok(count)
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool, StorageError> {
        Ok(self
            .sessions
            .get(session_id)
            .is_some_and(|entry| !entry.is_empty()))
    }
}
