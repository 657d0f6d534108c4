//! Core data models used throughout mdsearch.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the chunking, indexing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A markdown document handed to the indexer by a loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDocument {
    /// Stable identity of the document, also the store key.
    pub relative_path: String,
    pub title: String,
    pub raw_content: String,
    /// First paragraph under an `## Overview` heading, if any.
    pub overview: String,
}

impl SourceDocument {
    /// Hex SHA-256 of the raw content.
    pub fn content_hash(&self) -> String {
        content_hash(&self.raw_content)
    }
}

/// A slice of a document produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Heading the chunk was found under; empty for untitled content.
    pub section_title: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A chunk paired with its embedding, ready to be persisted.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub document_id: i64,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk as read back from a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub index: usize,
    pub text: String,
    pub section_title: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Catalogue entry for an indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// A nearest-neighbour hit joined with its document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: StoredChunk,
    pub document: DocumentRecord,
    /// Cosine distance; lower is closer.
    pub score: f32,
}

/// Row counts and configured width of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// Outcome of reconciling a store with the configured embedding width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionChange {
    Unchanged,
    /// No marker was persisted yet.
    Initialized,
    /// The corpus was purged because the width changed.
    Migrated { previous: usize },
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
