use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_QDRANT_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION_NAME: &str = "document_chunks";
const DEFAULT_MAX_DOCUMENT_SIZE: usize = 1024 * 1024;
/// Largest accepted image width or height when `MAX_IMAGE_DIMENSION` is unset.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 4096;
const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 64;
const DEFAULT_JOB_STATUS_RETENTION_SECS: u64 = 60 * 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Model used for document-mode embeddings.
    pub embedding_model: String,
    /// Model used for query-mode embeddings; falls back to `embedding_model`.
    pub embedding_query_model: Option<String>,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// API key for the Gemini embeddings endpoint.
    pub gemini_api_key: Option<String>,
    /// Optional override for the Gemini API base URL.
    pub gemini_url: Option<String>,
    /// Optional override for the Ollama runtime URL.
    pub ollama_url: Option<String>,
    /// Backend that stores chunks and their vectors.
    pub storage_backend: StorageBackend,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Largest accepted upload, in bytes.
    pub max_document_size: usize,
    /// Largest accepted image width or height, in pixels.
    pub max_image_dimension: u32,
    /// Directory validated uploads are written to.
    pub upload_dir: PathBuf,
    /// Characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Tesseract language code used for OCR.
    pub ocr_language: String,
    /// Tesseract executable name or path.
    pub tesseract_cmd: String,
    /// Jobs buffered ahead of the ingest dispatcher before uploads wait.
    pub ingest_queue_capacity: usize,
    /// Seconds a finished job's status stays queryable.
    pub job_status_retention_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Gemini embeddings API.
    Gemini,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process hashing embedder.
    Hashing,
}

/// Supported chunk storage backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Qdrant over its HTTP API.
    Qdrant,
    /// Process-local store; contents are lost on restart.
    Memory,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            embedding_provider: load_env("EMBEDDING_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
            })?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_query_model: load_env_optional("EMBEDDING_QUERY_MODEL"),
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            gemini_api_key: load_env_optional("GEMINI_API_KEY"),
            gemini_url: load_env_optional("GEMINI_URL"),
            ollama_url: load_env_optional("OLLAMA_URL"),
            storage_backend: load_env_optional("STORAGE_BACKEND")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("STORAGE_BACKEND".to_string()))
                })
                .transpose()?
                .unwrap_or(StorageBackend::Qdrant),
            qdrant_url: load_env_optional("QDRANT_URL")
                .unwrap_or_else(|| DEFAULT_QDRANT_URL.to_string()),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            max_document_size: parse_optional("MAX_DOCUMENT_SIZE")?
                .unwrap_or(DEFAULT_MAX_DOCUMENT_SIZE),
            max_image_dimension: parse_optional("MAX_IMAGE_DIMENSION")?
                .unwrap_or(DEFAULT_MAX_IMAGE_DIMENSION),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            chunk_size: parse_optional("CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            ocr_language: load_env_optional("OCR_LANGUAGE").unwrap_or_else(|| "eng".to_string()),
            tesseract_cmd: load_env_optional("TESSERACT_CMD")
                .unwrap_or_else(|| "tesseract".to_string()),
            ingest_queue_capacity: parse_optional("INGEST_QUEUE_CAPACITY")?
                .unwrap_or(DEFAULT_INGEST_QUEUE_CAPACITY),
            job_status_retention_secs: parse_optional("JOB_STATUS_RETENTION_SECS")?
                .unwrap_or(DEFAULT_JOB_STATUS_RETENTION_SECS),
            server_port: parse_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Model to use for the given embedding mode.
    pub fn query_model(&self) -> &str {
        self.embedding_query_model
            .as_deref()
            .unwrap_or(&self.embedding_model)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".to_string()));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("INGEST_QUEUE_CAPACITY".to_string()));
        }
        if self.embedding_provider == EmbeddingProvider::Gemini && self.gemini_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GEMINI_API_KEY".to_string()));
        }
        Ok(())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        storage = ?config.storage_backend,
        upload_dir = %config.upload_dir.display(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
