use super::{Document, LoadError};

/// Extract text page by page. Parsing is CPU bound, so it runs on the blocking pool.
pub(super) async fn load_pdf(bytes: Vec<u8>, origin: &str) -> Result<Vec<Document>, LoadError> {
    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|err| LoadError::Pdf(err.to_string()))
    })
    .await
    .map_err(|err| LoadError::Task(err.to_string()))??;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(index, content)| Document {
            source: origin.to_string(),
            page: u32::try_from(index).ok(),
            content,
        })
        .collect())
}
