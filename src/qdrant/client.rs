//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::processing::types::Chunk;
use crate::qdrant::{
    filters::session_filter,
    payload::{build_payload, compute_chunk_hash, current_timestamp_rfc3339, generate_point_id},
    types::{CountResponse, PointInsert, QdrantError},
};
use crate::storage::{ChunkStore, StorageError, ensure_aligned};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use std::path::Path;

/// Lightweight HTTP client for one Qdrant collection.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantService {
    /// Construct a client for `collection` on the Qdrant instance at `url`.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docsift/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
        })
    }

    /// Construct a client using the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, QdrantError> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            config.qdrant_collection_name.clone(),
        )
    }

    /// Ensure the collection and its payload indexes exist.
    pub async fn prepare_collection(&self, vector_size: u64) -> Result<(), QdrantError> {
        self.create_collection_if_not_exists(vector_size).await?;
        self.ensure_payload_indexes().await?;
        tracing::debug!(collection = %self.collection, vector_size, "Collection ready");
        Ok(())
    }

    /// Create the collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists().await? {
            return Ok(());
        }

        tracing::info!(collection = %self.collection, vector_size, "Creating collection");
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection created");
        })
        .await
    }

    /// Ensure keyword indexes exist for the fields used in session lookups.
    pub async fn ensure_payload_indexes(&self) -> Result<(), QdrantError> {
        let fields: [(&str, &str); 3] = [
            ("session_id", "keyword"),
            ("chunk_hash", "keyword"),
            ("timestamp", "datetime"),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(
                    collection = %self.collection,
                    field,
                    schema,
                    "Payload index ensured"
                );
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = %self.collection,
                    field,
                    schema,
                    "Payload index already exists"
                );
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(
                    collection = %self.collection,
                    field,
                    schema,
                    error = %error,
                    "Failed to ensure payload index"
                );
            }
        }

        Ok(())
    }

    /// Upload points for one document under `session_id`.
    pub async fn index_points(
        &self,
        session_id: &str,
        document: &Path,
        points: Vec<PointInsert>,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let document = document.display().to_string();
        let serialized: Vec<_> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": generate_point_id(),
                    "vector": point.vector,
                    "payload": build_payload(
                        session_id,
                        &document,
                        point.chunk_index,
                        &point.text,
                        &point.chunk_hash,
                        &now,
                    ),
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{}/points", self.collection))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                session_id,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Exact number of points stored for `session_id`.
    pub async fn count_session_points(&self, session_id: &str) -> Result<u64, QdrantError> {
        let body = json!({
            "filter": session_filter(session_id),
            "exact": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(
                collection = %self.collection,
                session_id,
                error = %error,
                "Qdrant count failed"
            );
            return Err(error);
        }

        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(
                    collection = %self.collection,
                    error = %error,
                    "Collection existence check failed"
                );
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl ChunkStore for QdrantService {
    async fn insert_document_chunks(
        &self,
        session_id: &str,
        document: &Path,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, StorageError> {
        ensure_aligned(chunks, &embeddings)?;
        let points = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| PointInsert {
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                chunk_hash: compute_chunk_hash(&chunk.text),
                vector,
            })
            .collect();

        Ok(self.index_points(session_id, document, points).await?)
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool, StorageError> {
        Ok(self.count_session_points(session_id).await? > 0)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
