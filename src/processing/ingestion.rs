//! Ingestion pipeline: load, split, identify, diff against the store, insert what is new.

use std::path::Path;

use walkdir::WalkDir;

use crate::documents::{self, Document, DocumentFormat, LoadError};
use crate::store::VectorStore;

use super::chunking::TextSplitter;
use super::identity::{assign_chunk_ids, select_new_chunks};
use super::types::{IngestOutcome, PipelineError};

/// Turns uploaded or on-disk documents into stored chunks.
#[derive(Clone)]
pub struct IngestionPipeline {
    store: VectorStore,
    splitter: TextSplitter,
}

impl IngestionPipeline {
    /// Combine a vector store with a splitter configuration.
    pub fn new(store: VectorStore, splitter: TextSplitter) -> Self {
        Self { store, splitter }
    }

    /// Ingest uploaded bytes. Every chunk's source becomes `filename`.
    ///
    /// Re-ingesting the same file with the same splitter inserts nothing.
    pub async fn ingest_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        format: DocumentFormat,
    ) -> Result<IngestOutcome, PipelineError> {
        let loaded = documents::load_bytes(bytes, filename, format).await?;
        self.ingest_documents(loaded, filename).await
    }

    /// Ingest a file from disk, using its file name as the source.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome, PipelineError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| LoadError::UnsupportedFormat(path.display().to_string()))?
            .to_string();
        let loaded = documents::load_path(path).await?;
        self.ingest_documents(loaded, &filename).await
    }

    async fn ingest_documents(
        &self,
        mut loaded: Vec<Document>,
        filename: &str,
    ) -> Result<IngestOutcome, PipelineError> {
        for document in &mut loaded {
            document.source = filename.to_string();
        }
        let pages = loaded.len();

        let chunks = assign_chunk_ids(self.splitter.split_documents(&loaded));
        let produced = chunks.len();

        let existing = self.store.exists_ids().await?;
        tracing::debug!(
            filename,
            existing = existing.len(),
            "Fetched existing chunk ids"
        );
        let fresh = select_new_chunks(chunks, &existing);
        let skipped_existing = produced - fresh.len();

        let inserted = if fresh.is_empty() {
            tracing::info!(filename, chunks = produced, "No new chunks to add");
            0
        } else {
            self.store.insert(&fresh).await?
        };

        tracing::info!(
            filename,
            pages,
            chunks = produced,
            inserted,
            skipped_existing,
            "Document ingested"
        );
        Ok(IngestOutcome {
            pages,
            chunks: produced,
            inserted,
            skipped_existing,
        })
    }

    /// Ingest every PDF and Markdown file below `directory`, in sorted path order.
    ///
    /// Other files are skipped. The first failing file aborts the walk.
    pub async fn ingest_directory(&self, directory: &Path) -> Result<IngestOutcome, PipelineError> {
        let mut paths: Vec<_> = WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| DocumentFormat::from_path(path).is_ok())
            .collect();
        paths.sort();

        let mut total = IngestOutcome::default();
        for path in &paths {
            let outcome = self.ingest_path(path).await?;
            total.absorb(outcome);
        }
        tracing::info!(
            directory = %directory.display(),
            files = paths.len(),
            inserted = total.inserted,
            "Directory ingested"
        );
        Ok(total)
    }

    /// Remove every stored chunk and report how many were removed.
    pub async fn clear_database(&self) -> Result<usize, PipelineError> {
        let deleted = self.store.delete_all().await?;
        if deleted == 0 {
            tracing::info!("No vectors found in the database to delete");
        } else {
            tracing::info!(deleted, "Cleared vector database");
        }
        Ok(deleted)
    }

    /// Number of stored chunks.
    pub async fn stored_chunks(&self) -> Result<usize, PipelineError> {
        Ok(self.store.count().await?)
    }
}
