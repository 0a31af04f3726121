#![deny(missing_docs)]

//! Core library for the docsift document ingestion service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Document ingestion pipeline.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Chunk persistence contract and backends.
pub mod storage;
