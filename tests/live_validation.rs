use std::{env, sync::Once};

use docqa::{
    config,
    embedding::{Embedder, build_embedder},
    generation::{Generator, build_completer},
    processing::{DocumentQa, QaService},
    qdrant::QdrantIndex,
    store::VectorIndex,
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("VECTOR_STORE", "qdrant");
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("QDRANT_COLLECTION_NAME", "docqa-live");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "all-minilm");
        set_default_env("EMBEDDING_DIMENSION", "384");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        config::init_config().expect("live configuration");
    });
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_collection_is_ready() {
    init_config_once();
    let config = config::get_config();
    let index = QdrantIndex::connect(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        &config.qdrant_collection_name,
        config.embedding_dimension,
        config.request_timeout,
    )
    .await
    .expect("Qdrant should be reachable");
    index.count().await.expect("count points");
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let embedder = build_embedder(config::get_config()).expect("embedder");
    let vectors = embedder
        .embed(vec!["docqa live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input text");
    let dimension = config::get_config().embedding_dimension;
    assert_eq!(vectors[0].len(), dimension, "embedding dimension mismatch");
}

#[tokio::test]
#[ignore = "Requires live Ollama completions"]
async fn live_ollama_completion_counts_tokens() {
    init_config_once();
    let completer = build_completer(config::get_config()).expect("completer");
    let generation = Generator::new(completer)
        .generate("Reply with the single word: ready")
        .await
        .expect("completion");
    assert!(!generation.text.is_empty());
    assert!(generation.token_count > 0);
}

#[tokio::test]
#[ignore = "Requires live Qdrant and Ollama"]
async fn live_markdown_question_answering() {
    init_config_once();
    let service = QaService::from_config(config::get_config())
        .await
        .expect("service");
    let outcome = service
        .ingest_upload(
            b"# Capture\n\nThe objective of the game is to capture the opposing flag.".to_vec(),
            "live-rules.md",
            docqa::documents::DocumentFormat::Markdown,
        )
        .await
        .expect("ingest");
    assert_eq!(outcome.chunks, 1);

    let answer = service.answer(None).await.expect("answer");
    assert!(answer.context.contains("Article Title: live-rules.md"));
    assert!(answer.token_count > 0);
}
