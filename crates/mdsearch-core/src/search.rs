//! Pure ranking helpers shared by hybrid search backends.
//!
//! Nothing here performs I/O: the app crate embeds the query and talks to
//! the store, then hands the raw hits to these functions.

use std::collections::HashSet;

use crate::models::{SearchResult, SourceDocument};

/// Keep the first (closest) result per document path, preserving order.
///
/// Store results arrive sorted by ascending distance, so the survivor for
/// each path is its best-scoring chunk.
pub fn dedup_by_path(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.document.path.clone()))
        .collect()
}

/// Catalogue documents whose title, content or overview contains `query`,
/// compared case-insensitively. Catalogue order is preserved.
pub fn text_matches<'a>(
    catalogue: &'a [SourceDocument],
    query: &str,
) -> impl Iterator<Item = &'a SourceDocument> {
    let needle = query.trim().to_lowercase();
    catalogue.iter().filter(move |doc| {
        !needle.is_empty()
            && [&doc.title, &doc.raw_content, &doc.overview]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
    })
}
