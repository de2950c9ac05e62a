//! Core data types and error definitions for the processing pipeline.

use serde::Serialize;
use thiserror::Error;

use crate::documents::LoadError;
use crate::generation::CompletionError;
use crate::store::GatewayError;

/// Errors produced while configuring the splitter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Windows must hold at least one character.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every window.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge {
        /// Configured window size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Errors emitted by the ingestion and retrieval pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document could not be parsed.
    #[error("Failed to load document: {0}")]
    Load(#[from] LoadError),
    /// Embedding or vector index access failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The language model backend failed.
    #[error("Failed to generate answer: {0}")]
    Completion(#[from] CompletionError),
}

/// A window of document text with its deterministic identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Window text, whitespace trimmed and never empty.
    pub content: String,
    /// Filename the chunk came from.
    pub source: String,
    /// Zero-based page number, absent for Markdown.
    pub page: Option<u32>,
    /// Position of the chunk within its `(source, page)` group.
    pub sequence_in_page: u32,
    /// `"{source}:{page}:{sequence_in_page}"`; empty until identifiers are assigned.
    pub id: String,
}

/// Summary of one ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Documents (pages) produced by the loader.
    pub pages: usize,
    /// Chunks produced by the splitter.
    pub chunks: usize,
    /// Chunks newly written to the store.
    pub inserted: usize,
    /// Chunks skipped because their id was already stored.
    pub skipped_existing: usize,
}

impl IngestOutcome {
    /// Fold another outcome into this one, for directory ingestion.
    pub fn absorb(&mut self, other: IngestOutcome) {
        self.pages += other.pages;
        self.chunks += other.chunks;
        self.inserted += other.inserted;
        self.skipped_existing += other.skipped_existing;
    }
}

/// Retrieved chunk together with its rank in the context.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query.
    pub score: f32,
    /// 1-based rank, rendered as `Source ID: n`.
    pub citation: usize,
}

/// Answer produced by the retrieval pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Question actually asked, after defaulting.
    pub query: String,
    /// Completion text.
    pub response: String,
    /// Citation context inserted into the prompt.
    pub context: String,
    /// Tokens in `response`.
    pub token_count: usize,
    /// Chunks the context was built from, best first.
    pub hits: Vec<RetrievalHit>,
}
