//! Storage abstraction for mdsearch.
//!
//! The [`VectorStore`] trait covers everything the indexer and hybrid search
//! need from a backend: a path-keyed document catalogue, per-document chunk
//! sets with embeddings, and brute-force nearest-neighbour search.
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! must allow many concurrent readers with a single writer.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    DimensionChange, DocumentRecord, EmbeddedChunk, SearchResult, StoreStats, StoredChunk,
};

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`initialize`](VectorStore::initialize) | Idempotent schema creation |
/// | [`ensure_dimension`](VectorStore::ensure_dimension) | Purge and reshape on width change |
/// | [`upsert_document`](VectorStore::upsert_document) | Insert or update a document by path |
/// | [`insert_chunks`](VectorStore::insert_chunks) | Atomically replace a document's chunks |
/// | [`replace_document`](VectorStore::replace_document) | Upsert a document and replace its chunks in one write |
/// | [`search`](VectorStore::search) | Cosine kNN joined with document metadata |
/// | [`needs_update`](VectorStore::needs_update) | Content-hash change detection |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the backing schema if it does not exist yet.
    async fn initialize(&self) -> Result<()>;

    /// Reconcile the stored corpus with an embedding width.
    ///
    /// When the persisted width differs, every chunk and document record is
    /// deleted and chunk storage is recreated for `dimension`.
    async fn ensure_dimension(&self, dimension: usize) -> Result<DimensionChange>;

    /// Width every stored and queried vector must have.
    async fn dimension(&self) -> usize;

    /// Insert or update the document at `path`, returning its id.
    ///
    /// The id of an existing path never changes.
    async fn upsert_document(&self, path: &str, title: &str, content_hash: &str) -> Result<i64>;

    async fn get_document(&self, path: &str) -> Result<Option<DocumentRecord>>;

    /// Delete a document and its chunks. Returns whether it existed.
    async fn delete_document(&self, path: &str) -> Result<bool>;

    /// Replace all chunks of `document_id` with `chunks` in one atomic step.
    ///
    /// # Panics
    ///
    /// Panics if any embedding width differs from [`dimension`](VectorStore::dimension).
    /// Callers validate provider output before handing it over.
    async fn insert_chunks(&self, document_id: i64, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Upsert the document at `path` and replace its chunk set in one atomic
    /// write, returning the document id.
    ///
    /// Either both the new content hash and the new chunks are stored, or
    /// neither is. The `document_id` carried by `chunks` is ignored; rows are
    /// written under the id of `path`.
    ///
    /// # Panics
    ///
    /// Same width contract as [`insert_chunks`](VectorStore::insert_chunks).
    async fn replace_document(
        &self,
        path: &str,
        title: &str,
        content_hash: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<i64>;

    /// The `limit` chunks closest to `query`, ascending by cosine distance.
    ///
    /// A query whose width differs from the store's is an error.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// Chunks of one document ordered by index.
    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<StoredChunk>>;

    /// True when `path` is unknown or stored under a different hash.
    async fn needs_update(&self, path: &str, content_hash: &str) -> Result<bool>;

    /// All documents ordered by path.
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Assert the width of every chunk handed to [`VectorStore::insert_chunks`].
pub fn assert_chunk_dimensions(chunks: &[EmbeddedChunk], dimension: usize) {
    for c in chunks {
        assert_eq!(
            c.embedding.len(),
            dimension,
            "chunk {} carries a {}-wide embedding, store expects {}",
            c.chunk.index,
            c.embedding.len(),
            dimension
        );
    }
}
