//! Retrieval pipeline: nearest chunks, numbered citation context, prompt, answer.

use crate::generation::Generator;
use crate::store::VectorStore;

use super::types::{Answer, PipelineError, RetrievalHit};

/// Question used when the caller sends none.
pub const DEFAULT_QUESTION: &str = "what is the objective of the game?";

/// Chunks retrieved per question.
pub const TOP_K: usize = 5;

/// Prompt sent to the language model. `{context}` and `{question}` are substituted verbatim.
pub const PROMPT_TEMPLATE: &str = concat!(
    "\nYou are a technical documentation assistant.\n",
    "Your task is to answer the following question using only the information provided in the context.\n",
    "Ensure that your answer is concise, accurate, and directly supported by the context.\n",
    "Whenever you reference supporting information, include only its citation in the format [Source ID: n] (do not include any excerpts or snippet text from the context).\n",
    "If the context does not contain enough information to answer the question, state that explicitly.\n",
    "\n",
    "Context:\n",
    "{context}\n",
    "\n",
    "Question: {question}\n",
    "\n",
    "Answer (with citations): \n",
);

/// Fall back to [`DEFAULT_QUESTION`] for absent or blank queries.
pub fn resolve_query(query: Option<&str>) -> String {
    match query {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => DEFAULT_QUESTION.to_string(),
    }
}

/// Render hits as numbered citation blocks. Scores are not shown.
pub fn format_context(hits: &[RetrievalHit]) -> String {
    let blocks: Vec<String> = hits
        .iter()
        .map(|hit| {
            format!(
                "Source ID: {}\nArticle Title: {}\nArticle Snippet: {}",
                hit.citation, hit.chunk.source, hit.chunk.content
            )
        })
        .collect();
    format!("\n\n{}", blocks.join("\n\n"))
}

/// Substitute context and question into [`PROMPT_TEMPLATE`].
pub fn render_prompt(context: &str, question: &str) -> String {
    let (head, rest) = PROMPT_TEMPLATE
        .split_once("{context}")
        .unwrap_or((PROMPT_TEMPLATE, ""));
    let (middle, tail) = rest.split_once("{question}").unwrap_or((rest, ""));
    format!("{head}{context}{middle}{question}{tail}")
}

/// Answers questions from stored chunks.
#[derive(Clone)]
pub struct RetrievalPipeline {
    store: VectorStore,
    generator: Generator,
}

impl RetrievalPipeline {
    /// Combine the vector store with a generator.
    pub fn new(store: VectorStore, generator: Generator) -> Self {
        Self { store, generator }
    }

    /// Nearest chunks for `question`, ranked from 1.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievalHit>, PipelineError> {
        let hits = self.store.similarity_search(question, TOP_K).await?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(index, (chunk, score))| RetrievalHit {
                chunk,
                score,
                citation: index + 1,
            })
            .collect())
    }

    /// Retrieve, build the prompt, and generate an answer.
    pub async fn answer(&self, query: Option<&str>) -> Result<Answer, PipelineError> {
        let question = resolve_query(query);
        let hits = self.retrieve(&question).await?;
        let context = format_context(&hits);
        let prompt = render_prompt(&context, &question);
        tracing::debug!(hits = hits.len(), prompt_bytes = prompt.len(), "Prompt rendered");

        let generation = self.generator.generate(&prompt).await?;
        tracing::info!(
            hits = hits.len(),
            token_count = generation.token_count,
            "Query answered"
        );
        Ok(Answer {
            query: question,
            response: generation.text,
            context,
            token_count: generation.token_count,
            hits,
        })
    }
}
