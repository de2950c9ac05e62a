//! Service facade wiring the ingestion and retrieval pipelines to their backends.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, VectorStoreBackend};
use crate::documents::DocumentFormat;
use crate::embedding::{Embedder, EmbeddingError, build_embedder};
use crate::generation::{Completer, CompletionError, Generator, build_completer};
use crate::qdrant::{QdrantError, QdrantIndex};
use crate::store::{LocalIndex, StoreError, VectorIndex, VectorStore};

use super::chunking::TextSplitter;
use super::evaluation::{EvalCase, EvaluationReport, Evaluator};
use super::ingestion::IngestionPipeline;
use super::retrieval::RetrievalPipeline;
use super::types::{Answer, ChunkingError, IngestOutcome, PipelineError};

/// Failures while assembling the service from configuration.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Splitter settings were rejected.
    #[error("Invalid splitter configuration: {0}")]
    Splitter(#[from] ChunkingError),
    /// The embedding client could not be built.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// The completion client could not be built.
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// The local index could not be opened.
    #[error("Failed to open local index: {0}")]
    LocalIndex(#[from] StoreError),
    /// The Qdrant collection could not be prepared.
    #[error("Failed to prepare Qdrant collection: {0}")]
    Qdrant(#[from] QdrantError),
}

/// Abstraction over the question-answering pipelines used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait DocumentQa: Send + Sync {
    /// Ingest an uploaded file whose format has already been validated.
    async fn ingest_upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        format: DocumentFormat,
    ) -> Result<IngestOutcome, PipelineError>;

    /// Answer a question; absent or blank questions use the default question.
    async fn answer(&self, query: Option<String>) -> Result<Answer, PipelineError>;

    /// Remove every stored chunk, returning how many were removed.
    async fn clear_database(&self) -> Result<usize, PipelineError>;
}

/// Owns both pipelines over one shared vector store.
///
/// Construct it once near process start and share it through an `Arc`.
#[derive(Clone)]
pub struct QaService {
    ingestion: IngestionPipeline,
    retrieval: RetrievalPipeline,
    evaluator: Evaluator,
}

impl QaService {
    /// Assemble the service from explicit backends.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completer: Arc<dyn Completer>,
        splitter: TextSplitter,
    ) -> Self {
        let store = VectorStore::new(embedder, index);
        let retrieval = RetrievalPipeline::new(store.clone(), Generator::new(completer.clone()));
        Self {
            ingestion: IngestionPipeline::new(store, splitter),
            evaluator: Evaluator::new(retrieval.clone(), completer),
            retrieval,
        }
    }

    /// Build every backend selected by configuration.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        let splitter = TextSplitter::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )?;
        let embedder = build_embedder(config)?;
        let completer = build_completer(config)?;

        let index: Arc<dyn VectorIndex> = match config.vector_store {
            VectorStoreBackend::Local => {
                Arc::new(LocalIndex::open(&config.persist_directory).await?)
            }
            VectorStoreBackend::Qdrant => Arc::new(
                QdrantIndex::connect(
                    &config.qdrant_url,
                    config.qdrant_api_key.clone(),
                    &config.qdrant_collection_name,
                    embedder.dimension(),
                    config.request_timeout,
                )
                .await?,
            ),
        };
        tracing::info!(
            backend = ?config.vector_store,
            chunk_size = splitter.chunk_size(),
            chunk_overlap = splitter.chunk_overlap(),
            completion_model = %config.completion_model,
            "Document QA service ready"
        );

        Ok(Self::new(embedder, index, completer, splitter))
    }

    /// Ingest a single file from disk.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome, PipelineError> {
        self.ingestion.ingest_path(path).await
    }

    /// Ingest every supported file below a directory.
    pub async fn ingest_directory(&self, directory: &Path) -> Result<IngestOutcome, PipelineError> {
        self.ingestion.ingest_directory(directory).await
    }

    /// Number of stored chunks.
    pub async fn stored_chunks(&self) -> Result<usize, PipelineError> {
        self.ingestion.stored_chunks().await
    }

    /// Answer each case and let the completion model judge the answers.
    pub async fn evaluate(&self, cases: &[EvalCase]) -> EvaluationReport {
        self.evaluator.run(cases).await
    }
}

#[async_trait]
impl DocumentQa for QaService {
    async fn ingest_upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        format: DocumentFormat,
    ) -> Result<IngestOutcome, PipelineError> {
        self.ingestion.ingest_bytes(bytes, filename, format).await
    }

    async fn answer(&self, query: Option<String>) -> Result<Answer, PipelineError> {
        self.retrieval.answer(query.as_deref()).await
    }

    async fn clear_database(&self) -> Result<usize, PipelineError> {
        self.ingestion.clear_database().await
    }
}
