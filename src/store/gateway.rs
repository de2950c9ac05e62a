use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::{
    RecordMetadata, StoreError, VectorIndex, VectorRecord, compute_content_hash,
    current_timestamp_rfc3339, current_unix_micros,
};
use crate::embedding::{Embedder, EmbeddingError};
use crate::processing::Chunk;

/// Texts embedded per request to the embedding backend.
const EMBED_BATCH_SIZE: usize = 64;

/// Failures raised by [`VectorStore`] operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The vector index failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Computing embeddings failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Chunk-level facade over an embedder and a vector index.
#[derive(Clone)]
pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl VectorStore {
    /// Combine an embedding backend with an index backend.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Ids of every stored chunk.
    pub async fn exists_ids(&self) -> Result<HashSet<String>, GatewayError> {
        Ok(self.index.ids().await?)
    }

    /// Embed and store `chunks`. Callers filter out ids already present.
    ///
    /// Returns the number of records the index reports as written.
    pub async fn insert(&self, chunks: &[Chunk]) -> Result<usize, GatewayError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let ingested_at = current_timestamp_rfc3339();
        let inserted_at_micros = current_unix_micros();
        let mut records = Vec::with_capacity(chunks.len());
        let mut position: u32 = 0;

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self.embedder.embed(texts).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }
            let dimension = self.embedder.dimension();
            if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimension) {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {dimension}-dimensional embeddings, received {}",
                    vector.len()
                ))
                .into());
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                records.push(VectorRecord {
                    id: chunk.id.clone(),
                    vector,
                    content: chunk.content.clone(),
                    metadata: RecordMetadata {
                        source: chunk.source.clone(),
                        page: chunk.page,
                        sequence_in_page: chunk.sequence_in_page,
                        content_hash: compute_content_hash(&chunk.content),
                        ingested_at: ingested_at.clone(),
                        inserted_at_micros,
                        batch_position: position,
                    },
                });
                position += 1;
            }
        }

        let written = self.index.upsert(records).await?;
        tracing::debug!(requested = chunks.len(), written, "Inserted chunks");
        Ok(written)
    }

    /// Remove every record, returning how many were removed. An empty store yields 0.
    pub async fn delete_all(&self) -> Result<usize, GatewayError> {
        let mut ids: Vec<String> = self.index.ids().await?.into_iter().collect();
        if ids.is_empty() {
            return Ok(0);
        }
        ids.sort();
        Ok(self.index.delete(&ids).await?)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<usize, GatewayError> {
        Ok(self.index.count().await?)
    }

    /// The `k` chunks closest to `query`, best first. Equal scores keep insertion order.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<(Chunk, f32)>, GatewayError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("no embedding returned for query".into())
            })?;

        let mut hits = self.index.query(&vector, k).await?;
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.metadata.insertion_key().cmp(&b.metadata.insertion_key()))
        });

        Ok(hits
            .into_iter()
            .map(|hit| {
                let chunk = Chunk {
                    content: hit.content,
                    source: hit.metadata.source,
                    page: hit.metadata.page,
                    sequence_in_page: hit.metadata.sequence_in_page,
                    id: hit.id,
                };
                (chunk, hit.score)
            })
            .collect())
    }
}
