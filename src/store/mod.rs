//! Vector storage: the [`VectorIndex`] backend seam and the [`VectorStore`] gateway over it.
//!
//! Records are keyed by chunk id. Backends never hold two records with the same id: the local
//! index ignores duplicates and Qdrant upserts onto a point id derived from the chunk id.

mod gateway;
mod local;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

use crate::qdrant::QdrantError;

pub use gateway::{GatewayError, VectorStore};
pub use local::LocalIndex;

/// Errors raised by vector index backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Qdrant request failed or returned an unexpected status.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Reading or writing the local index file failed.
    #[error("Vector index I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The local index file could not be encoded or decoded.
    #[error("Vector index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A vector does not match the dimension of the index.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of vectors already stored.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// A stored record is missing fields needed to rebuild it.
    #[error("Malformed stored record: {0}")]
    MalformedRecord(String),
}

/// Metadata persisted next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Filename the chunk came from.
    pub source: String,
    /// Zero-based page number, absent for Markdown.
    pub page: Option<u32>,
    /// Position of the chunk within its `(source, page)` group.
    pub sequence_in_page: u32,
    /// SHA-256 of the chunk text, hex encoded.
    pub content_hash: String,
    /// RFC 3339 time of ingestion.
    pub ingested_at: String,
    /// Microseconds since the Unix epoch when the batch was written.
    pub inserted_at_micros: u64,
    /// Position of the record within its insert batch.
    pub batch_position: u32,
}

impl RecordMetadata {
    /// Insertion-order key used to break score ties.
    pub fn insertion_key(&self) -> (u64, u32) {
        (self.inserted_at_micros, self.batch_position)
    }
}

/// Persisted form of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Chunk id, `"{source}:{page}:{sequence_in_page}"`.
    pub id: String,
    /// Embedding of `content`.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub content: String,
    /// Provenance and ordering metadata.
    pub metadata: RecordMetadata,
}

/// Record returned by a nearest-neighbour query, without its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// Chunk id.
    pub id: String,
    /// Cosine similarity to the query vector; higher is closer.
    pub score: f32,
    /// Chunk text.
    pub content: String,
    /// Provenance and ordering metadata.
    pub metadata: RecordMetadata,
}

/// Storage backend holding vectors keyed by chunk id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Every id currently stored. Empty on an empty index.
    async fn ids(&self) -> Result<HashSet<String>, StoreError>;

    /// Store records, leaving a single record per id. Returns how many records were written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, StoreError>;

    /// Remove the given ids. Returns how many records were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Up to `limit` records closest to `vector`, best first.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError>;
}

/// Compute a deterministic SHA-256 hash for chunk text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub(crate) fn current_unix_micros() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000).unwrap_or_default()
}

/// Cosine similarity; zero when either vector has no magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn record(id: &str, vector: Vec<f32>, position: u32) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            content: format!("content of {id}"),
            metadata: RecordMetadata {
                source: "guide.md".into(),
                page: None,
                sequence_in_page: position,
                content_hash: compute_content_hash(id),
                ingested_at: "2025-01-01T00:00:00Z".into(),
                inserted_at_micros: 1,
                batch_position: position,
            },
        }
    }
}
