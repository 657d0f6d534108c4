//! Helpers shared by the integration test binaries.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use mdsearch::cancel::CancelToken;
use mdsearch::embedding::{EmbedError, EmbeddingProvider};
use mdsearch_core::models::{
    DimensionChange, DocumentRecord, EmbeddedChunk, SearchResult, SourceDocument, StoreStats,
    StoredChunk,
};
use mdsearch_core::store::memory::InMemoryStore;
use mdsearch_core::store::VectorStore;

/// Deterministic bag-of-words vector: every lowercase word bumps one bucket.
pub fn bag_of_words(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % dimension as u64) as usize] += 1.0;
    }
    vector
}

/// Provider that embeds locally and records every batch it receives.
pub struct MockProvider {
    dimension: usize,
    output_dimension: usize,
    pub calls: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub failing: AtomicBool,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            output_dimension: dimension,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Advertises `dimension` but returns vectors of `actual` width.
    pub fn misreporting(dimension: usize, actual: usize) -> Self {
        Self {
            output_dimension: actual,
            ..Self::new(dimension)
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_batch(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(texts.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::Api {
                status: 500,
                body: "mock failure".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|t| bag_of_words(t, self.output_dimension))
            .collect())
    }
}

pub fn document(path: &str, title: &str, content: &str) -> SourceDocument {
    SourceDocument {
        relative_path: path.to_string(),
        title: title.to_string(),
        raw_content: content.to_string(),
        overview: String::new(),
    }
}

/// Bind an axum router to an ephemeral port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// In-memory store whose next chunk write fails once when armed.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    fail_next_write: AtomicBool,
}

impl FlakyStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: InMemoryStore::with_dimension(dimension),
            fail_next_write: AtomicBool::new(false),
        }
    }

    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_write(&self) -> anyhow::Result<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.inner.initialize().await
    }

    async fn ensure_dimension(&self, dimension: usize) -> anyhow::Result<DimensionChange> {
        self.inner.ensure_dimension(dimension).await
    }

    async fn dimension(&self) -> usize {
        self.inner.dimension().await
    }

    async fn upsert_document(
        &self,
        path: &str,
        title: &str,
        content_hash: &str,
    ) -> anyhow::Result<i64> {
        self.inner.upsert_document(path, title, content_hash).await
    }

    async fn get_document(&self, path: &str) -> anyhow::Result<Option<DocumentRecord>> {
        self.inner.get_document(path).await
    }

    async fn delete_document(&self, path: &str) -> anyhow::Result<bool> {
        self.inner.delete_document(path).await
    }

    async fn insert_chunks(
        &self,
        document_id: i64,
        chunks: &[EmbeddedChunk],
    ) -> anyhow::Result<()> {
        self.check_write()?;
        self.inner.insert_chunks(document_id, chunks).await
    }

    async fn replace_document(
        &self,
        path: &str,
        title: &str,
        content_hash: &str,
        chunks: &[EmbeddedChunk],
    ) -> anyhow::Result<i64> {
        self.check_write()?;
        self.inner
            .replace_document(path, title, content_hash, chunks)
            .await
    }

    async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<SearchResult>> {
        self.inner.search(query, limit).await
    }

    async fn chunks_for_document(&self, document_id: i64) -> anyhow::Result<Vec<StoredChunk>> {
        self.inner.chunks_for_document(document_id).await
    }

    async fn needs_update(&self, path: &str, content_hash: &str) -> anyhow::Result<bool> {
        self.inner.needs_update(path, content_hash).await
    }

    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentRecord>> {
        self.inner.list_documents().await
    }

    async fn stats(&self) -> anyhow::Result<StoreStats> {
        self.inner.stats().await
    }
}
