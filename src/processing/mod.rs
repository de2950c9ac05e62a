//! Document processing pipeline: splitting, identification, ingestion, retrieval and evaluation.

pub mod chunking;
pub mod evaluation;
pub mod identity;
mod ingestion;
pub mod retrieval;
mod service;
pub mod types;

pub use chunking::TextSplitter;
pub use evaluation::{EvalCase, EvaluationError, EvaluationReport, Evaluator, default_cases};
pub use ingestion::IngestionPipeline;
pub use retrieval::{DEFAULT_QUESTION, PROMPT_TEMPLATE, RetrievalPipeline, TOP_K};
pub use service::{DocumentQa, QaService, ServiceInitError};
pub use types::{Answer, Chunk, ChunkingError, IngestOutcome, PipelineError, RetrievalHit};
