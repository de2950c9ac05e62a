//! Token counting for generated answers.
//!
//! The model's own `tiktoken` encoding is preferred. Local models such as `llama3.2:1b` have
//! none, so counting falls back to `cl100k_base`, and to whitespace-separated words if no BPE
//! table can be loaded at all.

use std::sync::Arc;

use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model};

/// Counts tokens of generated text. Construction and counting never fail.
#[derive(Clone)]
pub struct TokenCounter {
    encoding: Option<Arc<CoreBPE>>,
}

impl TokenCounter {
    /// Resolve the encoding for `model`, falling back as described in the module docs.
    pub fn for_model(model: &str) -> Self {
        let encoding = match get_bpe_from_model(model.trim()) {
            Ok(encoding) => Some(encoding),
            Err(model_err) => {
                tracing::debug!(
                    model,
                    error = %model_err,
                    "No tokenizer registered for model; using cl100k_base"
                );
                match cl100k_base() {
                    Ok(encoding) => Some(encoding),
                    Err(error) => {
                        tracing::warn!(
                            error = %error,
                            "cl100k_base unavailable; counting whitespace-separated words"
                        );
                        None
                    }
                }
            }
        };
        Self {
            encoding: encoding.map(Arc::new),
        }
    }

    #[cfg(test)]
    pub(crate) fn whitespace() -> Self {
        Self { encoding: None }
    }

    /// Number of tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        match &self.encoding {
            Some(encoding) => encoding.encode_ordinary(text).len(),
            None => text.split_whitespace().count(),
        }
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("bpe", &self.encoding.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_cl100k() {
        let counter = TokenCounter::for_model("llama3.2:1b");
        let reference = cl100k_base().expect("cl100k");
        let text = "The objective of the game is to capture the flag [Source ID: 1].";
        assert_eq!(counter.count(text), reference.encode_ordinary(text).len());
    }

    #[test]
    fn known_model_uses_its_encoding() {
        let counter = TokenCounter::for_model("gpt-4o");
        assert!(counter.count("hello world") > 0);
    }

    #[test]
    fn whitespace_counter_counts_words() {
        let counter = TokenCounter::whitespace();
        assert_eq!(counter.count("  one two\nthree "), 3);
        assert_eq!(counter.count(""), 0);
    }
}
