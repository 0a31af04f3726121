//! Core data types and error definitions for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Canonical document kinds accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Document with a PDF text layer.
    Pdf,
    /// Raster image whose text is recovered with OCR.
    Image,
}

impl DocumentType {
    /// Stable wire value used in API payloads and job records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(Self::Pdf),
            "image" => Ok(Self::Image),
            other => Err(ProcessingError::UnknownDocumentType(other.to_string())),
        }
    }
}

/// Text recovered from one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    /// Concatenated text units; may be empty.
    pub text: String,
    /// Number of PDF pages read, `None` for images.
    pub page_count: Option<usize>,
}

/// One window of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Window contents.
    pub text: String,
    /// Position of the window in the chunk sequence.
    pub index: usize,
}

/// A document scheduled for background processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestJob {
    /// Caller-generated session key the chunks are stored under.
    pub session_id: String,
    /// Location of the validated upload on disk.
    pub path: PathBuf,
    /// Type reported by validation.
    pub document_type: DocumentType,
}

/// What happened at the storage step of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceStatus {
    /// All chunks were written.
    Stored {
        /// Number of chunks written.
        chunks: usize,
    },
    /// Nothing to store because the document produced no text.
    Skipped,
    /// The store rejected the write; the chunks are lost.
    Failed {
        /// Storage error message.
        error: String,
    },
}

/// Summary of a finished pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingOutcome {
    /// Session the document belongs to.
    pub session_id: String,
    /// Number of chunks produced.
    pub chunk_count: usize,
    /// Number of PDF pages read, if any.
    pub page_count: Option<usize>,
    /// Result of the storage step.
    pub persistence: PersistenceStatus,
}

/// Rejections raised while checking uploaded bytes.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Sniffed MIME type has no registered validator.
    #[error("Unsupported file type: {mime}")]
    UnsupportedType {
        /// MIME type inferred from the bytes.
        mime: String,
    },
    /// Registered validator rejected the content.
    #[error("{0}")]
    Invalid(String),
}

/// Failures while reading text out of a stored document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Referenced file does not exist.
    #[error("Provided document not found: {0}")]
    NotFound(PathBuf),
    /// File exists but could not be read.
    #[error("Failed to read document {path}: {source}")]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF could not be parsed.
    #[error("Error in parsing the document {path}: {message}")]
    Pdf {
        /// Document path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
    /// Image could not be decoded.
    #[error("Error opening image {path}: {message}")]
    Image {
        /// Document path.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },
    /// OCR engine could not run or exited with an error.
    #[error("OCR failed: {0}")]
    Ocr(String),
    /// Blocking extraction task did not complete.
    #[error("Extraction task aborted: {0}")]
    Worker(String),
}

/// Errors produced while splitting text into windows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Window size of zero can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave a positive step between windows.
    #[error("chunk overlap {overlap} must be smaller than chunk size {size}")]
    InvalidOverlap {
        /// Requested window size.
        size: usize,
        /// Requested overlap.
        overlap: usize,
    },
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Document type string did not name a known type.
    #[error("Unsupported document type: {0}")]
    UnknownDocumentType(String),
    /// Text extraction failed.
    #[error("Failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking parameters were rejected.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
    /// Provider returned a different number of vectors than chunks.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of chunks sent.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
}
