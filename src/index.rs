//! Indexing pipeline: chunk → embed → store.
//!
//! A document is re-indexed only when its content hash changed (or when
//! forced). Embedding happens before the store is touched, and the new hash
//! is committed together with the new chunks, so a failure at either step
//! leaves the previous hash in place and the document is picked up again on
//! the next run.

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use mdsearch_core::chunk::{chunk_markdown, ChunkOptions};
use mdsearch_core::models::{EmbeddedChunk, SourceDocument};
use mdsearch_core::store::VectorStore;

use crate::cancel::CancelToken;
use crate::embedding::{EmbedError, EmbeddingProvider};

/// What [`Indexer::index_document`] did with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Content hash unchanged.
    Skipped,
    Indexed { chunks: usize },
}

/// Totals for one [`Indexer::index_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

/// Text sent to the provider for one chunk: the document title, the section
/// title when present, a blank line, then the chunk body.
pub fn context_text(title: &str, section_title: &str, body: &str) -> String {
    if section_title.is_empty() {
        format!("{}\n\n{}", title, body)
    } else {
        format!("{} - {}\n\n{}", title, section_title, body)
    }
}

pub struct Indexer<'a, S: ?Sized, P: ?Sized> {
    store: &'a S,
    provider: &'a P,
    options: ChunkOptions,
}

impl<'a, S, P> Indexer<'a, S, P>
where
    S: VectorStore + ?Sized,
    P: EmbeddingProvider + ?Sized,
{
    pub fn new(store: &'a S, provider: &'a P, options: ChunkOptions) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Index one document unless its stored hash already matches.
    pub async fn index_document(
        &self,
        doc: &SourceDocument,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<IndexOutcome> {
        let hash = doc.content_hash();
        if !force && !self.store.needs_update(&doc.relative_path, &hash).await? {
            debug!(path = %doc.relative_path, "unchanged, skipping");
            return Ok(IndexOutcome::Skipped);
        }

        let chunks = chunk_markdown(&doc.raw_content, self.options);
        let texts: Vec<String> = chunks
            .iter()
            .map(|c| context_text(&doc.title, &c.section_title, &c.text))
            .collect();

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.provider
                .embed_batch(&texts, cancel)
                .await
                .with_context(|| format!("Failed to embed {}", doc.relative_path))?
        };

        if vectors.len() != chunks.len() {
            bail!(
                "provider returned {} embeddings for {} chunks of {}",
                vectors.len(),
                chunks.len(),
                doc.relative_path
            );
        }
        let dimension = self.store.dimension().await;
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            bail!(
                "provider returned a {}-dimensional embedding for {}, store expects {}",
                bad.len(),
                doc.relative_path,
                dimension
            );
        }

        // Row ids are assigned by the store.
        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedChunk {
                document_id: 0,
                chunk,
                embedding,
            })
            .collect();
        self.store
            .replace_document(&doc.relative_path, &doc.title, &hash, &embedded)
            .await?;

        info!(path = %doc.relative_path, chunks = embedded.len(), "indexed");
        Ok(IndexOutcome::Indexed {
            chunks: embedded.len(),
        })
    }

    /// Index every document in order. Failures are logged and counted; a
    /// cancellation stops the run.
    pub async fn index_all(
        &self,
        docs: &[SourceDocument],
        force: bool,
        cancel: &CancelToken,
    ) -> IndexReport {
        let mut report = IndexReport::default();

        for doc in docs {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.index_document(doc, force, cancel).await {
                Ok(IndexOutcome::Skipped) => report.skipped += 1,
                Ok(IndexOutcome::Indexed { chunks }) => {
                    report.indexed += 1;
                    report.chunks += chunks;
                }
                Err(err) if is_cancellation(&err) => {
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    warn!(path = %doc.relative_path, error = %format!("{:#}", err), "failed to index document");
                    report.failed += 1;
                }
            }
        }

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            "indexing finished"
        );
        report
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|e| e.downcast_ref::<EmbedError>().is_some_and(EmbedError::is_cancelled))
}
