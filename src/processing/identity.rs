//! Deterministic chunk identifiers and the existing-id diff.
//!
//! Ids have the form `"{source}:{page}:{sequence_in_page}"`. Pages without a number render as
//! `None`, so a Markdown file yields `"guide.md:None:0"`. This format is the persisted key and
//! must not change.

use std::collections::HashSet;

use super::types::Chunk;

/// Render a page number the way it appears inside chunk ids.
pub fn page_label(page: Option<u32>) -> String {
    match page {
        Some(page) => page.to_string(),
        None => "None".to_string(),
    }
}

/// Build the id for a chunk position.
pub fn chunk_id(source: &str, page: Option<u32>, sequence_in_page: u32) -> String {
    format!("{source}:{}:{sequence_in_page}", page_label(page))
}

/// Group chunks by `(source, page)` and number them within each group.
///
/// The sort is stable, so chunks keep their splitter order inside a group even when the
/// loader interleaved pages. Unnumbered pages sort before numbered ones.
pub fn assign_chunk_ids(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_by(|a, b| (a.source.as_str(), a.page).cmp(&(b.source.as_str(), b.page)));

    let mut previous: Option<(String, Option<u32>)> = None;
    let mut sequence = 0;
    for chunk in &mut chunks {
        let same_group = previous
            .as_ref()
            .is_some_and(|(source, page)| *source == chunk.source && *page == chunk.page);
        sequence = if same_group { sequence + 1 } else { 0 };
        chunk.sequence_in_page = sequence;
        chunk.id = chunk_id(&chunk.source, chunk.page, sequence);
        if !same_group {
            previous = Some((chunk.source.clone(), chunk.page));
        }
    }
    chunks
}

/// Keep only chunks whose id is not in `existing`, preserving order.
pub fn select_new_chunks(chunks: Vec<Chunk>, existing: &HashSet<String>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .filter(|chunk| !existing.contains(&chunk.id))
        .collect()
}
