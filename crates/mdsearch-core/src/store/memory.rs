//! In-memory [`VectorStore`] for tests and for hosts without SQLite.
//!
//! All state sits behind one `std::sync::RwLock`, so chunk replacement and
//! dimension migration are atomic with respect to readers. Search is
//! brute-force cosine distance over every stored vector.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    DimensionChange, DocumentRecord, EmbeddedChunk, SearchResult, StoreStats, StoredChunk,
};
use crate::vector::cosine_distance;

use super::{assert_chunk_dimensions, VectorStore};

#[derive(Default)]
struct State {
    dimension: Option<usize>,
    documents: BTreeMap<i64, DocumentRecord>,
    ids_by_path: HashMap<String, i64>,
    chunks: Vec<(StoredChunk, Vec<f32>)>,
    next_document_id: i64,
    next_chunk_id: i64,
}

impl State {
    fn upsert(&mut self, path: &str, title: &str, content_hash: &str) -> i64 {
        let now = Utc::now();

        if let Some(&id) = self.ids_by_path.get(path) {
            if let Some(doc) = self.documents.get_mut(&id) {
                doc.title = title.to_string();
                doc.content_hash = content_hash.to_string();
                doc.updated_at = now;
            }
            return id;
        }

        self.next_document_id += 1;
        let id = self.next_document_id;
        self.ids_by_path.insert(path.to_string(), id);
        self.documents.insert(
            id,
            DocumentRecord {
                id,
                path: path.to_string(),
                title: title.to_string(),
                content_hash: content_hash.to_string(),
                updated_at: now,
            },
        );
        id
    }

    fn replace_chunks(&mut self, document_id: i64, chunks: &[EmbeddedChunk]) {
        self.chunks.retain(|(c, _)| c.document_id != document_id);
        for ec in chunks {
            self.next_chunk_id += 1;
            let stored = StoredChunk {
                id: self.next_chunk_id,
                document_id,
                index: ec.chunk.index,
                text: ec.chunk.text.clone(),
                section_title: ec.chunk.section_title.clone(),
                start_offset: ec.chunk.start_offset,
                end_offset: ec.chunk.end_offset,
            };
            self.chunks.push((stored, ec.embedding.clone()));
        }
    }
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// An empty store with no dimension recorded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store already configured for `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            state: RwLock::new(State {
                dimension: Some(dimension),
                ..State::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_dimension(&self, dimension: usize) -> Result<DimensionChange> {
        let mut state = self.write()?;
        let change = match state.dimension {
            Some(current) if current == dimension => return Ok(DimensionChange::Unchanged),
            Some(previous) => DimensionChange::Migrated { previous },
            None => DimensionChange::Initialized,
        };
        state.chunks.clear();
        state.documents.clear();
        state.ids_by_path.clear();
        state.dimension = Some(dimension);
        Ok(change)
    }

    async fn dimension(&self) -> usize {
        self.read().map(|s| s.dimension.unwrap_or(0)).unwrap_or(0)
    }

    async fn upsert_document(&self, path: &str, title: &str, content_hash: &str) -> Result<i64> {
        Ok(self.write()?.upsert(path, title, content_hash))
    }

    async fn get_document(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let state = self.read()?;
        Ok(state
            .ids_by_path
            .get(path)
            .and_then(|id| state.documents.get(id))
            .cloned())
    }

    async fn delete_document(&self, path: &str) -> Result<bool> {
        let mut state = self.write()?;
        let Some(id) = state.ids_by_path.remove(path) else {
            return Ok(false);
        };
        state.documents.remove(&id);
        state.chunks.retain(|(c, _)| c.document_id != id);
        Ok(true)
    }

    async fn insert_chunks(&self, document_id: i64, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut state = self.write()?;
        assert_chunk_dimensions(chunks, state.dimension.unwrap_or(0));
        if !state.documents.contains_key(&document_id) {
            bail!("no document with id {}", document_id);
        }
        state.replace_chunks(document_id, chunks);
        Ok(())
    }

    async fn replace_document(
        &self,
        path: &str,
        title: &str,
        content_hash: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<i64> {
        let mut state = self.write()?;
        assert_chunk_dimensions(chunks, state.dimension.unwrap_or(0));
        let id = state.upsert(path, title, content_hash);
        state.replace_chunks(id, chunks);
        Ok(id)
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.read()?;
        let dimension = state.dimension.unwrap_or(0);
        if query.len() != dimension {
            bail!(
                "query vector has {} dimensions, store expects {}",
                query.len(),
                dimension
            );
        }

        let mut results: Vec<SearchResult> = state
            .chunks
            .iter()
            .filter_map(|(chunk, vector)| {
                let document = state.documents.get(&chunk.document_id)?;
                Some(SearchResult {
                    chunk: chunk.clone(),
                    document: document.clone(),
                    score: cosine_distance(query, vector),
                })
            })
            .collect();

        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results.truncate(limit);
        Ok(results)
    }

    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<StoredChunk>> {
        let state = self.read()?;
        let mut chunks: Vec<StoredChunk> = state
            .chunks
            .iter()
            .filter(|(c, _)| c.document_id == document_id)
            .map(|(c, _)| c.clone())
            .collect();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    async fn needs_update(&self, path: &str, content_hash: &str) -> Result<bool> {
        let state = self.read()?;
        Ok(state
            .ids_by_path
            .get(path)
            .and_then(|id| state.documents.get(id))
            .map_or(true, |doc| doc.content_hash != content_hash))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let state = self.read()?;
        let mut docs: Vec<DocumentRecord> = state.documents.values().cloned().collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.read()?;
        Ok(StoreStats {
            documents: state.documents.len(),
            chunks: state.chunks.len(),
            dimension: state.dimension.unwrap_or(0),
        })
    }
}
