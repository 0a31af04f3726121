//! Qdrant vector store integration.

pub mod client;
pub mod filters;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use filters::session_filter;
pub use payload::compute_chunk_hash;
pub use types::{PointInsert, QdrantError};
