use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa::{
    api, config, logging,
    metrics::RequestMetrics,
    processing::{DocumentQa, EvalCase, QaService, default_cases},
};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Question answering over ingested PDF and Markdown documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Ingest every PDF and Markdown file below a directory or a single file.
    Ingest {
        /// Defaults to `DOCUMENT_PATH`.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Answer a question from the stored chunks.
    Ask {
        /// Question to answer; the default question is used when omitted.
        question: Option<String>,
    },
    /// Remove every stored chunk.
    Clear,
    /// Answer known questions and let the model judge each answer.
    Evaluate {
        /// JSON array of `{name, question, expected_response}`; built-in cases when omitted.
        #[arg(long)]
        cases: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();

    let config = config::get_config();
    tracing::debug!(
        vector_store = ?config.vector_store,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        completion_model = %config.completion_model,
        server_port = config.server_port,
        "Loaded configuration"
    );
    let service = Arc::new(
        QaService::from_config(config)
            .await
            .context("Failed to initialize document QA service")?,
    );
    let metrics = Arc::new(RequestMetrics::new());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(service, metrics).await,
        Command::Ingest { path } => {
            let path = path.unwrap_or_else(|| config.document_path.clone());
            let outcome = metrics
                .track(async {
                    if path.is_dir() {
                        service.ingest_directory(&path).await
                    } else {
                        service.ingest_path(&path).await
                    }
                })
                .await
                .with_context(|| format!("Failed to ingest {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                pages = outcome.pages,
                chunks = outcome.chunks,
                inserted = outcome.inserted,
                skipped_existing = outcome.skipped_existing,
                "Ingestion finished"
            );
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            log_summary(&metrics);
            Ok(())
        }
        Command::Ask { question } => {
            metrics.record_generate();
            let answer = metrics
                .track(service.answer(question))
                .await
                .context("Failed to answer question")?;
            metrics.add_tokens(answer.token_count as u64);
            println!("{}", answer.response);
            for hit in &answer.hits {
                println!("[Source ID: {}] {} ({:.4})", hit.citation, hit.chunk.id, hit.score);
            }
            log_summary(&metrics);
            Ok(())
        }
        Command::Clear => {
            let deleted = metrics
                .track(service.clear_database())
                .await
                .context("Failed to clear the database")?;
            println!("Deleted {deleted} vectors from the database.");
            log_summary(&metrics);
            Ok(())
        }
        Command::Evaluate { cases } => {
            let cases = match cases {
                Some(path) => load_cases(&path).await?,
                None => default_cases(),
            };
            let report = service.evaluate(&cases).await;
            for case in &report.cases {
                let verdict = if case.passed { "PASS" } else { "FAIL" };
                match &case.error {
                    Some(error) => println!("[{verdict}] {}: {error}", case.name),
                    None => println!("[{verdict}] {}", case.name),
                }
            }
            println!(
                "Passed {} out of {} tests. Accuracy: {:.2}%",
                report.passed,
                report.total,
                report.accuracy()
            );
            Ok(())
        }
    }
}

async fn serve(service: Arc<QaService>, metrics: Arc<RequestMetrics>) -> Result<()> {
    let config = config::get_config();
    let app = api::create_router(
        service,
        metrics,
        &config.api_key,
        config.max_upload_bytes,
    );

    let listener = TcpListener::bind(("0.0.0.0", config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Listening on http://0.0.0.0:{}", config.server_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

async fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid evaluation cases in {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn log_summary(metrics: &RequestMetrics) {
    let snapshot = metrics.snapshot();
    tracing::info!(
        total_requests = snapshot.total_requests,
        failed = snapshot.total_failed_requests,
        average_process_time = snapshot.average_process_time,
        total_tokens_used = snapshot.total_tokens_used,
        "Run summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn evaluate_accepts_a_cases_file() {
        let cli = Cli::try_parse_from(["docqa", "evaluate", "--cases", "cases.json"])
            .expect("parse");
        match cli.command {
            Some(Command::Evaluate { cases }) => {
                assert_eq!(cases, Some(PathBuf::from("cases.json")));
            }
            _ => panic!("expected evaluate"),
        }
        let cli = Cli::try_parse_from(["docqa"]).expect("parse");
        assert!(cli.command.is_none());
    }

    #[tokio::test]
    async fn cases_file_is_parsed_as_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cases.json");
        tokio::fs::write(
            &path,
            r#"[{"name": "goal", "question": "Q?", "expected_response": "A"}]"#,
        )
        .await
        .expect("write");

        let cases = load_cases(&path).await.expect("cases");
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected_response, "A");
        assert!(load_cases(&dir.path().join("missing.json")).await.is_err());
    }
}
