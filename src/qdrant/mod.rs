//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantIndex;
pub use payload::point_id;
pub use types::QdrantError;
