//! Hybrid search: nearest-neighbour over chunk embeddings with a plain-text
//! fallback over the in-memory document catalogue.
//!
//! # Algorithm
//!
//! 1. A blank query returns nothing.
//! 2. With an engine configured, embed the query, fetch the `limit` nearest
//!    chunks, keep the best chunk per document path, and drop paths that are
//!    no longer in the catalogue.
//! 3. Without an engine, or when embedding or the store fails, scan titles,
//!    contents and overviews for a case-insensitive substring match.
//!
//! Vector hits carry their distance and the matching chunk; text hits carry
//! neither, so callers can always tell the two apart.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, warn};

use mdsearch_core::models::SourceDocument;
use mdsearch_core::search::{dedup_by_path, text_matches};
use mdsearch_core::store::VectorStore;

use crate::cancel::CancelToken;
use crate::embedding::EmbeddingProvider;

/// How a [`SearchHit`] was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitOrigin {
    Vector {
        /// Cosine distance of the best chunk; lower is closer.
        score: f32,
        chunk_text: String,
        section_title: String,
    },
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub overview: String,
    pub origin: HitOrigin,
}

impl SearchHit {
    pub fn is_vector(&self) -> bool {
        matches!(self.origin, HitOrigin::Vector { .. })
    }
}

pub struct HybridSearch<'a, S: ?Sized, P: ?Sized> {
    catalogue: &'a [SourceDocument],
    engine: Option<(&'a S, &'a P)>,
}

impl<'a, S, P> HybridSearch<'a, S, P>
where
    S: VectorStore + ?Sized,
    P: EmbeddingProvider + ?Sized,
{
    /// Text-only search over `catalogue`.
    pub fn new(catalogue: &'a [SourceDocument]) -> Self {
        Self {
            catalogue,
            engine: None,
        }
    }

    pub fn with_engine(mut self, store: &'a S, provider: &'a P) -> Self {
        self.engine = Some((store, provider));
        self
    }

    pub async fn search(&self, query: &str, limit: usize, cancel: &CancelToken) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        if let Some((store, provider)) = self.engine {
            match self.vector_hits(store, provider, query, limit, cancel).await {
                Ok(hits) => return hits,
                Err(err) => warn!(
                    error = %format!("{:#}", err),
                    "vector search failed, falling back to text search"
                ),
            }
        }

        self.text_hits(query, limit)
    }

    async fn vector_hits(
        &self,
        store: &S,
        provider: &P,
        query: &str,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchHit>> {
        let vector = provider.embed(query, cancel).await?;
        let results = store.search(&vector, limit).await?;
        debug!(candidates = results.len(), "vector search");

        let by_path: HashMap<&str, &SourceDocument> = self
            .catalogue
            .iter()
            .map(|d| (d.relative_path.as_str(), d))
            .collect();

        Ok(dedup_by_path(results)
            .into_iter()
            .filter_map(|r| {
                let doc = by_path.get(r.document.path.as_str())?;
                Some(SearchHit {
                    path: doc.relative_path.clone(),
                    title: doc.title.clone(),
                    overview: doc.overview.clone(),
                    origin: HitOrigin::Vector {
                        score: r.score,
                        chunk_text: r.chunk.text,
                        section_title: r.chunk.section_title,
                    },
                })
            })
            .collect())
    }

    fn text_hits(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        text_matches(self.catalogue, query)
            .take(limit)
            .map(|doc| SearchHit {
                path: doc.relative_path.clone(),
                title: doc.title.clone(),
                overview: doc.overview.clone(),
                origin: HitOrigin::Text,
            })
            .collect()
    }
}
