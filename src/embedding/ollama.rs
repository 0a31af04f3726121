//! Ollama `/api/embed` adapter.

use super::{EmbeddingClient, EmbeddingClientError, EmbeddingType};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    document_model: String,
    query_model: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Construct a client from explicit settings.
    pub fn new(
        base_url: impl Into<String>,
        document_model: impl Into<String>,
        query_model: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .user_agent("docsift/embeddings")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into(),
            document_model: document_model.into(),
            query_model: query_model.into(),
        }
    }

    /// Construct a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            config.embedding_model.clone(),
            config.query_model().to_string(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

/// Nomic models expect a task prefix on every input; other models take raw text.
fn task_prefix(model: &str, embedding_type: EmbeddingType) -> &'static str {
    if !model.to_lowercase().contains("nomic-embed") {
        return "";
    }
    match embedding_type {
        EmbeddingType::Document => "search_document: ",
        EmbeddingType::Query => "search_query: ",
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        embedding_type: EmbeddingType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let model = match embedding_type {
            EmbeddingType::Document => &self.document_model,
            EmbeddingType::Query => &self.query_model,
        };
        let prefix = task_prefix(model, embedding_type);
        let input: Vec<String> = texts
            .into_iter()
            .map(|text| format!("{prefix}{text}"))
            .collect();

        tracing::debug!(
            model = %model,
            texts = input.len(),
            mode = ?embedding_type,
            "Requesting Ollama embeddings"
        );

        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": model, "input": input }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "model '{model}' is not available in Ollama"
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let payload: EmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;

        Ok(payload.embeddings)
    }
}
