//! # mdsearch core
//!
//! Runtime-agnostic logic for mdsearch: data models, the markdown chunker,
//! vector encoding and distance, the [`store::VectorStore`] abstraction with
//! an in-memory backend, and the pure ranking helpers used by hybrid search.
//!
//! This crate has no tokio, sqlx, HTTP or filesystem dependencies. Embedding
//! providers and the SQLite store live in the `mdsearch` app crate.

pub mod chunk;
pub mod models;
pub mod search;
pub mod store;
pub mod vector;
