//! HTTP surface for the document QA service.
//!
//! Every route requires an `X-API-Key` header matching the configured secret:
//!
//! - `POST /ingest` – Multipart upload (field `document`) of a PDF or Markdown file. The file is
//!   validated by extension and MIME type, then chunked, embedded, and stored. Returns the chunk
//!   counters of the ingestion.
//! - `POST /generate` – Answer `{"query": "..."}` from the stored chunks with numbered citations.
//! - `GET /stats` – Request, generation, and token counters for this process.
//! - `DELETE /clear_database` – Remove every stored chunk.
//!
//! Requests are timed by a middleware that also sets `X-Process-Time` on each response.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Request, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::documents::DocumentFormat;
use crate::metrics::{MetricsSnapshot, RequestMetrics};
use crate::processing::{DocumentQa, PipelineError};

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Response header reporting the handling time in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";
/// Multipart field holding the uploaded file.
pub const UPLOAD_FIELD: &str = "document";

const GENERATION_FAILED: &str = "Error in processing query";

struct AppState<S> {
    service: Arc<S>,
    metrics: Arc<RequestMetrics>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[derive(Clone)]
struct ApiKey {
    digest: Vec<u8>,
}

impl ApiKey {
    fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).to_vec(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        Sha256::digest(candidate.as_bytes()).as_slice() == self.digest.as_slice()
    }
}

/// Build the HTTP router.
///
/// Metrics wrap authentication, so rejected requests are still counted (as failures).
pub fn create_router<S>(
    service: Arc<S>,
    metrics: Arc<RequestMetrics>,
    api_key: &str,
    max_upload_bytes: usize,
) -> Router
where
    S: DocumentQa + 'static,
{
    let state = AppState {
        service,
        metrics: Arc::clone(&metrics),
    };

    Router::new()
        .route("/ingest", post(ingest_document::<S>))
        .route("/generate", post(generate_answer::<S>))
        .route("/stats", get(get_stats::<S>))
        .route("/clear_database", delete(clear_database::<S>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            ApiKey::new(api_key),
            require_api_key,
        ))
        .layer(middleware::from_fn_with_state(metrics, record_metrics))
        .with_state(state)
}

async fn record_metrics(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    metrics.start_request();
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed();

    let status = response.status();
    metrics.finish_request(status.as_u16() < 400, elapsed);
    if let Ok(value) = HeaderValue::from_str(&format!("{:.4}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    tracing::debug!(
        status = status.as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Request handled"
    );
    response
}

async fn require_api_key(State(key): State<ApiKey>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    match provided {
        Some(candidate) if key.matches(candidate) => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "Invalid API Key" })),
            )
                .into_response()
        }
    }
}

/// Reasons an upload is rejected before reaching the pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The request carried no `document` field.
    #[error("No document provided.")]
    MissingDocument,
    /// Filename absent or without an extension.
    #[error("Invalid or missing filename.")]
    InvalidFilename,
    /// A `.pdf` upload declared a non-PDF MIME type.
    #[error("Invalid MIME type for PDF file.")]
    PdfContentType,
    /// A `.md` upload declared a MIME type other than Markdown or plain text.
    #[error("Invalid MIME type for Markdown file.")]
    MarkdownContentType,
    /// Extension other than `pdf` or `md`.
    #[error("Unsupported file extension. Only PDF and Markdown files are allowed.")]
    UnsupportedExtension,
}

/// Validate an upload's filename and declared MIME type, returning its format.
pub fn validate_upload(
    filename: Option<&str>,
    content_type: Option<&str>,
) -> Result<DocumentFormat, ValidationError> {
    let extension = filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, extension)| extension)
        .ok_or(ValidationError::InvalidFilename)?;
    let format =
        DocumentFormat::from_extension(extension).ok_or(ValidationError::UnsupportedExtension)?;

    if !content_type.is_some_and(|declared| format.accepts_content_type(declared)) {
        return Err(match format {
            DocumentFormat::Pdf => ValidationError::PdfContentType,
            DocumentFormat::Markdown => ValidationError::MarkdownContentType,
        });
    }
    Ok(format)
}

/// Success response for `POST /ingest`.
#[derive(Serialize)]
struct IngestResponse {
    detail: &'static str,
    chunks: usize,
    inserted: usize,
    skipped_existing: usize,
}

async fn ingest_document<S>(
    State(state): State<AppState<S>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError>
where
    S: DocumentQa,
{
    state.metrics.record_ingest();

    let (filename, format, bytes) = loop {
        let Some(field) = multipart.next_field().await? else {
            return Err(ValidationError::MissingDocument.into());
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let format = validate_upload(filename.as_deref(), field.content_type())?;
        let bytes = field.bytes().await?;
        break (filename.unwrap_or_default(), format, bytes);
    };
    tracing::info!(
        filename = %filename,
        bytes = bytes.len(),
        format = format.extension(),
        "Received upload"
    );

    let outcome = state
        .service
        .ingest_upload(bytes.to_vec(), &filename, format)
        .await
        .map_err(ApiError::Ingestion)?;

    Ok(Json(IngestResponse {
        detail: "File processed successfully.",
        chunks: outcome.chunks,
        inserted: outcome.inserted,
        skipped_existing: outcome.skipped_existing,
    }))
}

/// Request body for `POST /generate`.
#[derive(Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    query: Option<String>,
}

/// Response body for `POST /generate`.
#[derive(Serialize)]
#[serde(untagged)]
enum GenerateResponse {
    Answered {
        query: String,
        response: String,
        #[serde(rename = "sources(context)")]
        context: String,
        token_count: usize,
    },
    Failed {
        response: &'static str,
    },
}

async fn generate_answer<S>(
    State(state): State<AppState<S>>,
    Json(request): Json<GenerateRequest>,
) -> Json<GenerateResponse>
where
    S: DocumentQa,
{
    state.metrics.record_generate();

    match state.service.answer(request.query).await {
        Ok(answer) => {
            state.metrics.add_tokens(answer.token_count as u64);
            Json(GenerateResponse::Answered {
                query: answer.query,
                response: answer.response,
                context: answer.context,
                token_count: answer.token_count,
            })
        }
        Err(error) => {
            tracing::error!(error = %error, "Failed to answer query");
            Json(GenerateResponse::Failed {
                response: GENERATION_FAILED,
            })
        }
    }
}

async fn get_stats<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentQa,
{
    Json(state.metrics.snapshot())
}

/// Response body for `DELETE /clear_database`.
#[derive(Serialize)]
struct ClearResponse {
    detail: String,
    deleted: usize,
}

async fn clear_database<S>(
    State(state): State<AppState<S>>,
) -> Result<Json<ClearResponse>, ApiError>
where
    S: DocumentQa,
{
    let deleted = state
        .service
        .clear_database()
        .await
        .map_err(ApiError::Clear)?;
    Ok(Json(ClearResponse {
        detail: format!("Deleted {deleted} vectors from the database."),
        deleted,
    }))
}

enum ApiError {
    Validation(ValidationError),
    Upload(MultipartError),
    Ingestion(PipelineError),
    Clear(PipelineError),
}

impl From<ValidationError> for ApiError {
    fn from(inner: ValidationError) -> Self {
        Self::Validation(inner)
    }
}

impl From<MultipartError> for ApiError {
    fn from(inner: MultipartError) -> Self {
        Self::Upload(inner)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Validation(error) => {
                tracing::info!(reason = %error, "Rejected upload");
                (StatusCode::BAD_REQUEST, error.to_string())
            }
            Self::Upload(error) => {
                tracing::warn!(error = %error, status = %error.status(), "Failed to read upload");
                (
                    StatusCode::BAD_REQUEST,
                    "Failed to read uploaded file.".to_string(),
                )
            }
            Self::Ingestion(error) => {
                tracing::error!(error = %error, "Document ingestion failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process document ingestion.".to_string(),
                )
            }
            Self::Clear(error) => {
                tracing::error!(error = %error, "Clearing the database failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to clear the database.".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::LoadError;
    use crate::processing::{Answer, IngestOutcome};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const KEY: &str = "secret";
    const BOUNDARY: &str = "docqa-test-boundary";

    #[derive(Default)]
    struct StubQa {
        ingests: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DocumentQa for StubQa {
        async fn ingest_upload(
            &self,
            _bytes: Vec<u8>,
            _filename: &str,
            _format: DocumentFormat,
        ) -> Result<IngestOutcome, PipelineError> {
            self.ingests.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LoadError::Pdf("broken".into()).into());
            }
            Ok(IngestOutcome {
                pages: 1,
                chunks: 3,
                inserted: 2,
                skipped_existing: 1,
            })
        }

        async fn answer(&self, query: Option<String>) -> Result<Answer, PipelineError> {
            if self.fail {
                return Err(LoadError::Pdf("no backend".into()).into());
            }
            Ok(Answer {
                query: query.unwrap_or_else(|| "default".into()),
                response: "Reach the goal [Source ID: 1].".into(),
                context: "\n\nSource ID: 1\nArticle Title: a.md\nArticle Snippet: goal".into(),
                token_count: 7,
                hits: Vec::new(),
            })
        }

        async fn clear_database(&self) -> Result<usize, PipelineError> {
            if self.fail {
                return Err(LoadError::Task("store offline".into()).into());
            }
            Ok(3)
        }
    }

    fn router(service: Arc<StubQa>, metrics: Arc<RequestMetrics>) -> Router {
        create_router(service, metrics, KEY, 1024)
    }

    fn upload(filename: &str, content_type: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"document\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method(Method::POST)
            .uri("/ingest")
            .header(API_KEY_HEADER, KEY)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn generate(query: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/generate")
            .header(API_KEY_HEADER, KEY)
            .header("content-type", "application/json")
            .body(Body::from(query.to_string()))
            .expect("request")
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn upload_validation_messages() {
        assert_eq!(
            validate_upload(None, Some("application/pdf")),
            Err(ValidationError::InvalidFilename)
        );
        assert_eq!(
            validate_upload(Some("README"), Some("text/plain")),
            Err(ValidationError::InvalidFilename)
        );
        assert_eq!(
            validate_upload(Some("notes.txt"), Some("text/plain")),
            Err(ValidationError::UnsupportedExtension)
        );
        assert_eq!(
            validate_upload(Some("rules.pdf"), Some("text/plain")),
            Err(ValidationError::PdfContentType)
        );
        assert_eq!(
            validate_upload(Some("guide.md"), None),
            Err(ValidationError::MarkdownContentType)
        );
        assert_eq!(
            validate_upload(Some("guide.MD"), Some("text/plain; charset=utf-8")),
            Ok(DocumentFormat::Markdown)
        );
        assert_eq!(
            ValidationError::UnsupportedExtension.to_string(),
            "Unsupported file extension. Only PDF and Markdown files are allowed."
        );
    }

    #[tokio::test]
    async fn wrong_api_key_is_forbidden_and_counted_as_failure() {
        let metrics = Arc::new(RequestMetrics::new());
        let app = router(Arc::new(StubQa::default()), metrics.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .header(API_KEY_HEADER, "wrong")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(PROCESS_TIME_HEADER));
        assert_eq!(json_body(response).await["detail"], "Invalid API Key");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.total_failed_requests, 1);
    }

    #[tokio::test]
    async fn markdown_upload_reports_counters() {
        let service = Arc::new(StubQa::default());
        let metrics = Arc::new(RequestMetrics::new());
        let app = router(service.clone(), metrics.clone());

        let response = app
            .oneshot(upload("guide.md", "text/markdown", "# Guide"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "File processed successfully.");
        assert_eq!(body["chunks"], 3);
        assert_eq!(body["inserted"], 2);
        assert_eq!(body["skipped_existing"], 1);
        assert_eq!(service.ingests.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().ingest_requests, 1);
    }

    #[tokio::test]
    async fn unsupported_extension_never_reaches_pipeline() {
        let service = Arc::new(StubQa::default());
        let metrics = Arc::new(RequestMetrics::new());
        let app = router(service.clone(), metrics.clone());

        let response = app
            .oneshot(upload("notes.txt", "text/plain", "hello"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "Unsupported file extension. Only PDF and Markdown files are allowed."
        );
        assert_eq!(service.ingests.load(Ordering::SeqCst), 0);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingest_requests, 1);
        assert_eq!(snapshot.total_failed_requests, 1);
    }

    #[tokio::test]
    async fn pdf_with_wrong_mime_is_rejected() {
        let app = router(Arc::new(StubQa::default()), Arc::new(RequestMetrics::new()));
        let response = app
            .oneshot(upload("rules.pdf", "text/plain", "%PDF"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "Invalid MIME type for PDF file."
        );
    }

    #[tokio::test]
    async fn pipeline_failure_becomes_generic_500() {
        let service = Arc::new(StubQa {
            fail: true,
            ..StubQa::default()
        });
        let app = router(service, Arc::new(RequestMetrics::new()));
        let response = app
            .oneshot(upload("rules.pdf", "application/pdf", "not a pdf"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["detail"],
            "Failed to process document ingestion."
        );
    }

    #[tokio::test]
    async fn clear_failure_becomes_generic_500() {
        let service = Arc::new(StubQa {
            fail: true,
            ..StubQa::default()
        });
        let app = router(service, Arc::new(RequestMetrics::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/clear_database")
                    .header(API_KEY_HEADER, KEY)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Failed to clear the database." })
        );
    }

    #[tokio::test]
    async fn oversized_upload_is_a_bad_request() {
        let service = Arc::new(StubQa::default());
        let app = router(service.clone(), Arc::new(RequestMetrics::new()));
        let response = app
            .oneshot(upload("big.md", "text/markdown", &"x".repeat(4096)))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Failed to read uploaded file." })
        );
        assert_eq!(service.ingests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generate_returns_answer_and_counts_tokens() {
        let metrics = Arc::new(RequestMetrics::new());
        let app = router(Arc::new(StubQa::default()), metrics.clone());

        let response = app
            .oneshot(generate(json!({ "query": "How do I win?" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["query"], "How do I win?");
        assert_eq!(body["token_count"], 7);
        assert!(
            body["sources(context)"]
                .as_str()
                .expect("context")
                .contains("Source ID: 1")
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.generate_requests, 1);
        assert_eq!(snapshot.total_tokens_used, 7);
    }

    #[tokio::test]
    async fn generate_failure_is_reported_in_a_200_body() {
        let metrics = Arc::new(RequestMetrics::new());
        let service = Arc::new(StubQa {
            fail: true,
            ..StubQa::default()
        });
        let app = router(service, metrics.clone());

        let response = app
            .oneshot(generate(json!({})))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "response": "Error in processing query" })
        );
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.generate_requests, 1);
        assert_eq!(snapshot.total_tokens_used, 0);
        assert_eq!(snapshot.total_success_requests, 1);
    }

    #[tokio::test]
    async fn stats_include_the_current_request() {
        let app = router(Arc::new(StubQa::default()), Arc::new(RequestMetrics::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/stats")
                    .header(API_KEY_HEADER, KEY)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total_requests"], 1);
        assert_eq!(body["total_success_requests"], 0);
        assert_eq!(body["total_tokens_used"], 0);
        assert!(body.get("total_process_time").is_none());
    }

    #[tokio::test]
    async fn clear_database_reports_deleted_count() {
        let app = router(Arc::new(StubQa::default()), Arc::new(RequestMetrics::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/clear_database")
                    .header(API_KEY_HEADER, KEY)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Deleted 3 vectors from the database.", "deleted": 3 })
        );
    }
}
