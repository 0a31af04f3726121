//! HTTP surface for docsift.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `PUT /upload` – Accept a multipart `file`, enforce the size limit, validate the content,
//!   store it under the upload directory, and schedule the ingestion pipeline.
//! - `GET /sessions/:session_id` – Report the pipeline status for a session and whether any
//!   chunks have been stored for it.
//! - `GET /metrics` – Observe ingestion counters, including storage failures.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::config::Config;
use crate::processing::{
    DocumentType, IngestJob, IngestQueue, JobStatus, ProcessingApi, ValidationError,
    ValidatorRegistry,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Upload limits and destination.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Largest accepted file, in bytes.
    pub max_document_size: usize,
    /// Directory validated uploads are written to.
    pub upload_dir: PathBuf,
}

impl UploadSettings {
    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_document_size: config.max_document_size,
            upload_dir: config.upload_dir.clone(),
        }
    }
}

/// Shared handles used by the route handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<dyn ProcessingApi>,
    queue: IngestQueue,
    validators: Arc<ValidatorRegistry>,
    uploads: Arc<UploadSettings>,
}

impl AppState {
    /// Bundle the pipeline, its queue, the validators, and the upload settings.
    pub fn new(
        service: Arc<dyn ProcessingApi>,
        queue: IngestQueue,
        validators: ValidatorRegistry,
        uploads: UploadSettings,
    ) -> Self {
        Self {
            service,
            queue,
            validators: Arc::new(validators),
            uploads: Arc::new(uploads),
        }
    }
}

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .uploads
        .max_document_size
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/upload", put(upload_document))
        .route("/sessions/:session_id", get(get_session))
        .route("/metrics", get(get_metrics))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Envelope shared by upload responses.
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    data: Value,
}

/// Validate an uploaded document, store it, and schedule ingestion.
///
/// Responds before the pipeline runs; progress is reported by `GET /sessions/:session_id`.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let (filename, bytes) = read_file_field(&mut multipart).await?;
    let size = bytes.len();
    let limit = state.uploads.max_document_size;
    if size > limit {
        tracing::warn!(filename = %filename, size, limit, "Upload rejected: too large");
        return Err(ApiError::TooLarge {
            filename,
            size: Some(size),
            limit,
        });
    }

    let validators = state.validators.clone();
    let (validation, bytes) = tokio::task::spawn_blocking(move || {
        let validation = validators.validate_document(&bytes);
        (validation, bytes)
    })
    .await
    .map_err(|error| ApiError::Internal(format!("validation task failed: {error}")))?;
    let document_type = validation.map_err(|error| {
        tracing::warn!(
            filename = %filename,
            error = %error,
            "Upload rejected: invalid document"
        );
        ApiError::InvalidDocument {
            filename: filename.clone(),
            error,
        }
    })?;

    let session_id = Uuid::new_v4().to_string();
    let path = state.uploads.upload_dir.join(format!(
        "{session_id}.{}",
        stored_extension(&filename, document_type)
    ));
    tokio::fs::create_dir_all(&state.uploads.upload_dir)
        .await
        .map_err(|error| {
            ApiError::Internal(format!("failed to create upload directory: {error}"))
        })?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|error| ApiError::Internal(format!("failed to store upload: {error}")))?;

    let ticket = state
        .queue
        .submit(IngestJob {
            session_id: session_id.clone(),
            path,
            document_type,
        })
        .await;
    tracing::info!(
        session_id = ticket.session_id(),
        filename = %filename,
        %document_type,
        size,
        "Upload accepted"
    );

    Ok(Json(ApiResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        data: json!({
            "session_id": session_id,
            "document_type": document_type,
            "filename": filename,
            "size": size,
        }),
    }))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(ApiError::from)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(ApiError::from)? {
            bytes.extend_from_slice(&chunk);
        }
        return Ok((filename, bytes));
    }
    Err(ApiError::MissingFile)
}

/// Extension used for the stored copy: the declared one when it is a plain short token, else
/// a default for the validated type.
fn stored_extension(filename: &str, document_type: DocumentType) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| match document_type {
            DocumentType::Pdf => "pdf".to_string(),
            DocumentType::Image => "img".to_string(),
        })
}

/// Response body for `GET /sessions/:session_id`.
#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<JobStatus>,
    session_exists: bool,
}

/// Report job status and stored-chunk presence for one session.
async fn get_session(
    State(state): State<AppState>,
    UrlPath(session_id): UrlPath<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let job = state.queue.status(&session_id);
    let session_exists = state
        .service
        .session_exists(&session_id)
        .await
        .map_err(|error| ApiError::Internal(format!("failed to query chunk store: {error}")))?;

    if job.is_none() && !session_exists {
        return Err(ApiError::UnknownSession(session_id));
    }

    Ok(Json(SessionResponse {
        session_id,
        job,
        session_exists,
    }))
}

/// Return the ingestion metrics snapshot.
async fn get_metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepts: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands(State(state): State<AppState>) -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "PUT",
                path: "/upload",
                description: "Upload a PDF or image as multipart field \"file\". The document is \
                              validated from its bytes, stored, and chunked and embedded in the \
                              background. Response returns { \"session_id\": string, \
                              \"document_type\": \"pdf\" | \"image\" }.",
                accepts: Some(state.validators.supported_mime_types()),
                request_example: Some(json!({ "file": "<binary PDF, PNG, JPEG or WebP>" })),
            },
            CommandDescriptor {
                name: "session_status",
                method: "GET",
                path: "/sessions/:session_id",
                description: "Return the pipeline state for a session and whether its chunks are \
                              stored.",
                accepts: None,
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion counters, including chunk storage failures.",
                accepts: None,
                request_example: None,
            },
        ],
    })
}

enum ApiError {
    TooLarge {
        filename: String,
        size: Option<usize>,
        limit: usize,
    },
    InvalidDocument {
        filename: String,
        error: ValidationError,
    },
    MissingFile,
    UnknownSession(String),
    Internal(String),
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::TooLarge {
                filename: String::new(),
                size: None,
                limit: 0,
            };
        }
        Self::Internal(format!("failed to read multipart body: {error}"))
    }
}

fn describe_limit(limit: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if limit >= MIB && limit % MIB == 0 {
        format!("{} MB", limit / MIB)
    } else {
        format!("{limit} bytes")
    }
}

fn envelope(status: StatusCode, message: impl Into<String>, data: Value) -> Response {
    let body = ApiResponse {
        success: false,
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::TooLarge {
                filename,
                size,
                limit,
            } => {
                let message = if limit > 0 {
                    format!("Only files with size under {} are supported", describe_limit(limit))
                } else {
                    "Uploaded file is too large".to_string()
                };
                envelope(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    message,
                    json!({ "filename": filename, "size": size }),
                )
            }
            Self::InvalidDocument { filename, error } => envelope(
                StatusCode::BAD_REQUEST,
                "Upload a valid file",
                json!({ "error": error.to_string(), "filename": filename }),
            ),
            Self::MissingFile => envelope(
                StatusCode::BAD_REQUEST,
                "Upload a valid file",
                json!({ "error": "multipart field \"file\" is missing" }),
            ),
            Self::UnknownSession(session_id) => envelope(
                StatusCode::NOT_FOUND,
                "Unknown session",
                json!({ "session_id": session_id }),
            ),
            Self::Internal(error) => {
                tracing::error!(error = %error, "Request failed");
                envelope(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Unexpected error while processing the file",
                    Value::Null,
                )
            }
        }
    }
}
