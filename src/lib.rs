#![deny(missing_docs)]

//! Core library for the docqa document question-answering service.

/// HTTP routing, authentication, and request metrics middleware.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// PDF and Markdown loading.
pub mod documents;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Completion client abstraction and token counting.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Request and token metrics.
pub mod metrics;
/// Ingestion and retrieval pipelines.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector index abstraction, local index, and the embedding-aware gateway.
pub mod store;
