//! Document loaders turning uploaded bytes into page-level text.
//!
//! PDFs yield one [`Document`] per page with a zero-based page number. Markdown files yield a
//! single [`Document`] without a page number, rendered to plain text.

mod markdown;
mod pdf;

use std::path::Path;

use thiserror::Error;

pub use markdown::markdown_to_text;

/// Text of one page (or one whole file) together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Origin of the text; the ingestion pipeline rewrites this to the uploaded filename.
    pub source: String,
    /// Zero-based page number, absent for formats without pages.
    pub page: Option<u32>,
    /// Extracted plain text.
    pub content: String,
}

/// File formats accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    /// Portable Document Format, extracted page by page.
    Pdf,
    /// CommonMark/GitHub-flavoured Markdown.
    Markdown,
}

impl DocumentFormat {
    /// Resolve a format from a bare extension such as `"pdf"` or `"MD"`.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Resolve a format from the extension of a file path.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::from_extension(extension)
            .ok_or_else(|| LoadError::UnsupportedFormat(path.display().to_string()))
    }

    /// Lowercase extension used in filenames.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "md",
        }
    }

    /// Whether an upload's declared MIME type is acceptable for this format.
    pub fn accepts_content_type(self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match self {
            Self::Pdf => essence == "application/pdf",
            Self::Markdown => matches!(essence.as_str(), "text/markdown" | "text/plain"),
        }
    }
}

/// Failures raised while turning bytes into documents.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file extension does not map to a supported format.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
    /// Reading the file from disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The PDF could not be parsed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// Markdown input was not valid UTF-8.
    #[error("Markdown is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    /// The blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Parse raw bytes in the given format. `origin` becomes each document's initial source.
pub async fn load_bytes(
    bytes: Vec<u8>,
    origin: &str,
    format: DocumentFormat,
) -> Result<Vec<Document>, LoadError> {
    let documents = match format {
        DocumentFormat::Pdf => pdf::load_pdf(bytes, origin).await?,
        DocumentFormat::Markdown => markdown::load_markdown(&bytes, origin)?,
    };
    tracing::debug!(
        origin,
        format = format.extension(),
        pages = documents.len(),
        "Loaded document"
    );
    Ok(documents)
}

/// Read a file from disk and parse it according to its extension.
pub async fn load_path(path: &Path) -> Result<Vec<Document>, LoadError> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = tokio::fs::read(path).await?;
    load_bytes(bytes, &path.display().to_string(), format).await
}
