//! Embedding client abstraction and provider adapters.
//!
//! The pipeline only depends on [`EmbeddingClient`]; providers differ in transport and in how
//! they express the ingestion vs query distinction carried by [`EmbeddingType`].

mod gemini;
mod ollama;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Purpose of an embedding request; providers may pick different models or task hints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingType {
    /// Chunks stored at ingestion time.
    Document,
    /// User questions embedded at query time.
    Query,
}

impl EmbeddingType {
    /// Task type string understood by the Gemini API.
    pub fn gemini_task_type(self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce one embedding vector per supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        embedding_type: EmbeddingType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Deterministic embedding client that hashes bytes into a fixed-size unit vector.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize, embedding_type: EmbeddingType) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        // Query vectors are offset by one slot so the two modes never collide exactly.
        let shift = match embedding_type {
            EmbeddingType::Document => 0,
            EmbeddingType::Query => 1,
        };
        for (idx, byte) in text.bytes().enumerate() {
            let position = (idx + shift) % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        embedding_type: EmbeddingType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(
            dimension = self.dimension,
            texts = texts.len(),
            mode = ?embedding_type,
            "Generating hashing embeddings"
        );

        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension, embedding_type))
            .collect())
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(config: &Config) -> Box<dyn EmbeddingClient + Send + Sync> {
    match config.embedding_provider {
        EmbeddingProvider::Gemini => Box::new(GeminiEmbeddingClient::from_config(config)),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::from_config(config)),
        EmbeddingProvider::Hashing => {
            Box::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    }
}
