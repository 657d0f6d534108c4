//! # mdsearch
//!
//! Chunk markdown documents, embed the chunks through a remote or local
//! provider, store them in SQLite, and answer similarity queries with a
//! plain-text fallback.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  sources   │──▶│    index     │──▶│  SQLite  │
//! │ (markdown) │   │ chunk+embed  │   │ vectors  │
//! └────────────┘   └──────────────┘   └────┬─────┘
//!       │                                  │
//!       ▼                                  ▼
//! ┌────────────────────────────────────────────┐
//! │  search: kNN over chunks, text fallback    │
//! └────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`cancel`] | Cancellation token for embedding calls |
//! | [`embedding`] | OpenAI, Voyage and Ollama providers |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`index`] | Change-detecting indexer |
//! | [`search`] | Hybrid search |
//! | [`sources`] | Filesystem document loader |
//! | [`context`] | Application context |
//! | [`commands`] | CLI command implementations |
//!
//! Chunking, models, the store trait and the in-memory store live in
//! `mdsearch-core`.

pub mod cancel;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod index;
pub mod search;
pub mod sources;
pub mod sqlite_store;
