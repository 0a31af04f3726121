//! Gemini `batchEmbedContents` adapter.

use super::{EmbeddingClient, EmbeddingClientError, EmbeddingType};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Embedding client backed by the Gemini REST API.
pub struct GeminiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    document_model: String,
    query_model: String,
    dimension: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbeddingClient {
    /// Construct a client from explicit settings.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        document_model: impl Into<String>,
        query_model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        let http = Client::builder()
            .user_agent("docsift/embeddings")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            document_model: qualify_model(&document_model.into()),
            query_model: qualify_model(&query_model.into()),
            dimension,
        }
    }

    /// Construct a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .gemini_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string()),
            config.gemini_api_key.clone().unwrap_or_default(),
            config.embedding_model.clone(),
            config.query_model().to_string(),
            config.embedding_dimension,
        )
    }

    fn model_for(&self, embedding_type: EmbeddingType) -> &str {
        match embedding_type {
            EmbeddingType::Document => &self.document_model,
            EmbeddingType::Query => &self.query_model,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/{model}:batchEmbedContents",
            self.base_url.trim_end_matches('/')
        )
    }
}

fn qualify_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl EmbeddingClient for GeminiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        embedding_type: EmbeddingType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let model = self.model_for(embedding_type);
        tracing::debug!(
            model,
            texts = texts.len(),
            task_type = embedding_type.gemini_task_type(),
            "Requesting Gemini embeddings"
        );

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type: embedding_type.gemini_task_type(),
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        let response = self
            .http
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let payload: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;

        Ok(payload
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}
