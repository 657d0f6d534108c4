//! SQLite-backed [`VectorStore`].
//!
//! Schema:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `metadata` | key/value pairs; `embedding_dimension` records the vector width |
//! | `documents` | one row per path with title, content hash and update time |
//! | `chunks` | chunk text, offsets and the embedding BLOB, cascading on document delete |
//!
//! The `chunks.embedding` column carries a `CHECK` on its byte length, so the
//! table is dropped and recreated whenever the configured width changes.
//! Search is brute-force cosine distance computed in Rust.
//!
//! A `tokio::sync::RwLock` around the current width serialises writers
//! (upsert, chunk replacement, delete, migration) against readers.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::RwLock;
use tracing::{info, warn};

use mdsearch_core::models::{
    DimensionChange, DocumentRecord, EmbeddedChunk, SearchResult, StoreStats, StoredChunk,
};
use mdsearch_core::store::{assert_chunk_dimensions, VectorStore};
use mdsearch_core::vector::{cosine_distance, decode_vector, encode_vector, BYTES_PER_COMPONENT};

use crate::db;

const DIMENSION_KEY: &str = "embedding_dimension";

pub struct SqliteStore {
    pool: SqlitePool,
    dimension: RwLock<usize>,
}

impl SqliteStore {
    /// Wrap an open pool. Call [`VectorStore::initialize`] and
    /// [`VectorStore::ensure_dimension`] before use, or use [`SqliteStore::open`].
    pub fn new(pool: SqlitePool, dimension: usize) -> Self {
        Self {
            pool,
            dimension: RwLock::new(dimension),
        }
    }

    /// Open the database at `db_path`, create the schema and migrate it to
    /// `dimension`.
    pub async fn open(db_path: &Path, dimension: usize) -> Result<(Self, DimensionChange)> {
        let pool = db::connect(db_path).await?;
        let store = Self::new(pool, dimension);
        store.initialize().await?;
        let change = store.ensure_dimension(dimension).await?;
        Ok((store, change))
    }

    /// Open an already-initialized database at the width it was built with.
    ///
    /// Never creates, migrates or purges anything, so it suits commands that
    /// only read or delete and have no embedding provider to ask for a width.
    pub async fn open_existing(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            bail!(
                "Database not initialized at {}. Run `mdsearch init` first.",
                db_path.display()
            );
        }
        let pool = db::connect(db_path).await?;
        let dimension = read_dimension_marker(&pool)
            .await
            .with_context(|| format!("Failed to read schema of {}", db_path.display()))?
            .with_context(|| {
                format!(
                    "Database at {} has no {} marker. Run `mdsearch index` first.",
                    db_path.display(),
                    DIMENSION_KEY
                )
            })?;
        Ok(Self::new(pool, dimension))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn create_chunks_sql(dimension: usize) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            section_title TEXT NOT NULL DEFAULT '',
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            embedding BLOB NOT NULL CHECK (length(embedding) = {}),
            UNIQUE(document_id, chunk_index)
        )
        "#,
        dimension * BYTES_PER_COMPONENT
    )
}

const CREATE_CHUNKS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)";

const DOCUMENT_COLUMNS: &str = "id, path, title, content_hash, updated_at";

const UPSERT_DOCUMENT: &str = r#"
    INSERT INTO documents (path, title, content_hash, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(path) DO UPDATE SET
        title = excluded.title,
        content_hash = excluded.content_hash,
        updated_at = excluded.updated_at
    RETURNING id
"#;

async fn read_dimension_marker(pool: &SqlitePool) -> Result<Option<usize>> {
    let stored: Option<String> = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
        .bind(DIMENSION_KEY)
        .fetch_optional(pool)
        .await?;
    stored
        .map(|v| {
            v.parse::<usize>()
                .with_context(|| format!("Corrupt {} marker: {:?}", DIMENSION_KEY, v))
        })
        .transpose()
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Result<DocumentRecord> {
    Ok(DocumentRecord {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        title: row.try_get("title")?,
        content_hash: row.try_get("content_hash")?,
        updated_at: timestamp(row.try_get("updated_at")?),
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<StoredChunk> {
    Ok(StoredChunk {
        id: row.try_get("chunk_id")?,
        document_id: row.try_get("document_id")?,
        index: row.try_get::<i64, _>("chunk_index")? as usize,
        text: row.try_get("chunk_text")?,
        section_title: row.try_get("section_title")?,
        start_offset: row.try_get::<i64, _>("start_offset")? as usize,
        end_offset: row.try_get::<i64, _>("end_offset")? as usize,
    })
}

/// Delete the chunk rows of `document_id` and insert `chunks` in their place,
/// inside the caller's transaction.
async fn replace_chunk_rows(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: i64,
    chunks: &[EmbeddedChunk],
) -> Result<()> {
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await?;

    for ec in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (document_id, chunk_index, chunk_text, section_title,
                                start_offset, end_offset, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document_id)
        .bind(ec.chunk.index as i64)
        .bind(&ec.chunk.text)
        .bind(&ec.chunk.section_title)
        .bind(ec.chunk.start_offset as i64)
        .bind(ec.chunk.end_offset as i64)
        .bind(encode_vector(&ec.embedding))
        .execute(&mut **tx)
        .await
        .with_context(|| {
            format!(
                "Failed to insert chunk {} of document {}",
                ec.chunk.index, document_id
            )
        })?;
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn initialize(&self) -> Result<()> {
        let dimension = self.dimension.write().await;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL DEFAULT '',
                content_hash TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(&create_chunks_sql(*dimension))
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_CHUNKS_INDEX).execute(&self.pool).await?;

        Ok(())
    }

    async fn ensure_dimension(&self, dimension: usize) -> Result<DimensionChange> {
        let mut current = self.dimension.write().await;

        let stored = read_dimension_marker(&self.pool).await?;

        let change = match stored {
            Some(previous) if previous == dimension => {
                *current = dimension;
                return Ok(DimensionChange::Unchanged);
            }
            Some(previous) => DimensionChange::Migrated { previous },
            None => DimensionChange::Initialized,
        };

        if let DimensionChange::Migrated { previous } = change {
            warn!(
                previous,
                dimension, "embedding dimension changed; purging indexed documents"
            );
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS chunks")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query(&create_chunks_sql(dimension))
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREATE_CHUNKS_INDEX).execute(&mut *tx).await?;
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(DIMENSION_KEY)
            .bind(dimension.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        *current = dimension;
        info!(dimension, "vector store ready");
        Ok(change)
    }

    async fn dimension(&self) -> usize {
        *self.dimension.read().await
    }

    async fn upsert_document(&self, path: &str, title: &str, content_hash: &str) -> Result<i64> {
        let _guard = self.dimension.write().await;

        let id: i64 = sqlx::query_scalar(UPSERT_DOCUMENT)
            .bind(path)
            .bind(title)
            .bind(content_hash)
            .bind(Utc::now().timestamp())
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert document {}", path))?;

        Ok(id)
    }

    async fn get_document(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let _guard = self.dimension.read().await;

        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE path = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn delete_document(&self, path: &str) -> Result<bool> {
        let _guard = self.dimension.write().await;

        let mut tx = self.pool.begin().await?;
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
            .bind(path)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(id) = id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn insert_chunks(&self, document_id: i64, chunks: &[EmbeddedChunk]) -> Result<()> {
        let dimension = self.dimension.write().await;
        assert_chunk_dimensions(chunks, *dimension);

        let mut tx = self.pool.begin().await?;
        replace_chunk_rows(&mut tx, document_id, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_document(
        &self,
        path: &str,
        title: &str,
        content_hash: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<i64> {
        let dimension = self.dimension.write().await;
        assert_chunk_dimensions(chunks, *dimension);

        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(UPSERT_DOCUMENT)
            .bind(path)
            .bind(title)
            .bind(content_hash)
            .bind(Utc::now().timestamp())
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert document {}", path))?;
        replace_chunk_rows(&mut tx, id, chunks).await?;
        tx.commit().await?;

        Ok(id)
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let dimension = self.dimension.read().await;
        if query.len() != *dimension {
            bail!(
                "query vector has {} dimensions, store expects {}",
                query.len(),
                *dimension
            );
        }

        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.chunk_index, c.chunk_text,
                   c.section_title, c.start_offset, c.end_offset, c.embedding,
                   d.id, d.path, d.title, d.content_hash, d.updated_at
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let vector = decode_vector(&blob)?;
            results.push(SearchResult {
                chunk: chunk_from_row(row)?,
                document: document_from_row(row)?,
                score: cosine_distance(query, &vector),
            });
        }

        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results.truncate(limit);
        Ok(results)
    }

    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<StoredChunk>> {
        let _guard = self.dimension.read().await;

        let rows = sqlx::query(
            r#"
            SELECT id AS chunk_id, document_id, chunk_index, chunk_text,
                   section_title, start_offset, end_offset
            FROM chunks
            WHERE document_id = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn needs_update(&self, path: &str, content_hash: &str) -> Result<bool> {
        let _guard = self.dimension.read().await;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM documents WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;

        Ok(stored.as_deref() != Some(content_hash))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let _guard = self.dimension.read().await;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY path",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let dimension = self.dimension.read().await;

        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
            dimension: *dimension,
        })
    }
}
