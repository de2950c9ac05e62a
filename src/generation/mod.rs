//! Generation stage: send a rendered prompt to a language model and measure the answer.

mod ollama;
pub mod tokens;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;

pub use ollama::{ANSWER_TEMPERATURE, OllamaCompleter};
pub use tokens::TokenCounter;

/// Errors surfaced by completion backends.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Backend unreachable, model missing, or HTTP client construction failed.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Backend answered with an error status.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Backend response could not be parsed.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by language model backends.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Model identifier, used to pick a tokenizer.
    fn model(&self) -> &str;

    /// Produce the completion for `prompt` as raw text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Build the completion backend from configuration.
pub fn build_completer(config: &Config) -> Result<Arc<dyn Completer>, CompletionError> {
    Ok(Arc::new(OllamaCompleter::new(
        &config.ollama_url,
        &config.completion_model,
        config.request_timeout,
    )?))
}

/// Answer text with its token count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Raw completion text.
    pub text: String,
    /// Tokens in `text` according to the model's tokenizer or its fallback.
    pub token_count: usize,
}

/// Pairs a completion backend with the token counter for its model.
#[derive(Clone)]
pub struct Generator {
    completer: Arc<dyn Completer>,
    tokens: TokenCounter,
}

impl Generator {
    /// Wrap `completer`, resolving a tokenizer for its model once.
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        let tokens = TokenCounter::for_model(completer.model());
        Self { completer, tokens }
    }

    /// Generate an answer for `prompt`.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, CompletionError> {
        let text = self.completer.complete(prompt).await?;
        let token_count = self.tokens.count(&text);
        tracing::debug!(
            model = self.completer.model(),
            token_count,
            "Generated answer"
        );
        Ok(Generation { text, token_count })
    }
}
