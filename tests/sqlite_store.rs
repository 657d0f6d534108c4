//! SQLite vector store against a real database file.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use mdsearch::db;
use mdsearch::sqlite_store::SqliteStore;
use mdsearch_core::models::{Chunk, DimensionChange, EmbeddedChunk};
use mdsearch_core::store::VectorStore;
use mdsearch_core::vector::encode_vector;

fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data").join("embeddings.db")
}

fn embedded(document_id: i64, index: usize, text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
    EmbeddedChunk {
        document_id,
        chunk: Chunk {
            index,
            text: text.to_string(),
            section_title: format!("Section {}", index),
            start_offset: index * 100,
            end_offset: index * 100 + text.len(),
        },
        embedding,
    }
}

#[tokio::test]
async fn test_open_creates_schema_and_records_dimension() {
    let tmp = TempDir::new().unwrap();
    let path = db_path(&tmp);

    let (store, change) = SqliteStore::open(&path, 3).await.unwrap();
    assert_eq!(change, DimensionChange::Initialized);
    assert!(path.exists());
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.documents, stats.chunks, stats.dimension), (0, 0, 3));
    store.close().await;

    let (store, change) = SqliteStore::open(&path, 3).await.unwrap();
    assert_eq!(change, DimensionChange::Unchanged);
    assert_eq!(store.dimension().await, 3);
    store.close().await;
}

#[tokio::test]
async fn test_documents_and_chunks_persist_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = db_path(&tmp);

    let (store, _) = SqliteStore::open(&path, 2).await.unwrap();
    let id = store.upsert_document("docs/a.md", "A", "hash-a").await.unwrap();
    store
        .insert_chunks(
            id,
            &[
                embedded(id, 1, "second", vec![0.0, 1.0]),
                embedded(id, 0, "first", vec![1.0, 0.0]),
            ],
        )
        .await
        .unwrap();
    store.close().await;

    let (store, _) = SqliteStore::open(&path, 2).await.unwrap();
    let doc = store.get_document("docs/a.md").await.unwrap().unwrap();
    assert_eq!(doc.id, id);
    assert_eq!(doc.title, "A");
    assert_eq!(doc.content_hash, "hash-a");

    let chunks = store.chunks_for_document(id).await.unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(chunks[1].section_title, "Section 1");
    assert_eq!(chunks[1].start_offset, 100);
    assert_eq!(chunks[1].end_offset, 106);
    store.close().await;
}

#[tokio::test]
async fn test_upsert_keeps_id_and_updates_hash() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();

    assert!(store.needs_update("a.md", "h1").await.unwrap());
    let id = store.upsert_document("a.md", "A", "h1").await.unwrap();
    assert!(!store.needs_update("a.md", "h1").await.unwrap());

    let again = store.upsert_document("a.md", "A v2", "h2").await.unwrap();
    assert_eq!(id, again);
    assert!(store.needs_update("a.md", "h1").await.unwrap());
    assert!(!store.needs_update("a.md", "h2").await.unwrap());

    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].title, "A v2");
}

#[tokio::test]
async fn test_insert_chunks_replaces_previous_set() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let id = store.upsert_document("a.md", "A", "h").await.unwrap();

    store
        .insert_chunks(
            id,
            &[
                embedded(id, 0, "old zero", vec![1.0, 0.0]),
                embedded(id, 1, "old one", vec![0.0, 1.0]),
                embedded(id, 2, "old two", vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();
    store
        .insert_chunks(id, &[embedded(id, 0, "new zero", vec![1.0, 0.0])])
        .await
        .unwrap();

    let chunks = store.chunks_for_document(id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "new zero");

    store.insert_chunks(id, &[]).await.unwrap();
    assert_eq!(store.stats().await.unwrap().chunks, 0);
}

#[tokio::test]
async fn test_failed_insert_leaves_old_chunks() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let id = store.upsert_document("a.md", "A", "h").await.unwrap();
    store
        .insert_chunks(id, &[embedded(id, 0, "kept", vec![1.0, 0.0])])
        .await
        .unwrap();

    // Duplicate chunk indices violate the unique constraint mid-transaction.
    let result = store
        .insert_chunks(
            id,
            &[
                embedded(id, 0, "new", vec![1.0, 0.0]),
                embedded(id, 0, "dup", vec![0.0, 1.0]),
            ],
        )
        .await;
    assert!(result.is_err());

    let chunks = store.chunks_for_document(id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "kept");
}

#[tokio::test]
async fn test_search_orders_by_distance_and_joins_documents() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let a = store.upsert_document("a.md", "Alpha", "h").await.unwrap();
    let b = store.upsert_document("b.md", "Beta", "h").await.unwrap();
    store
        .insert_chunks(a, &[embedded(a, 0, "east", vec![1.0, 0.0])])
        .await
        .unwrap();
    store
        .insert_chunks(
            b,
            &[
                embedded(b, 0, "north", vec![0.0, 1.0]),
                embedded(b, 1, "north-east", vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let results = store.search(&[1.0, 0.1], 10).await.unwrap();
    let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["east", "north-east", "north"]);
    assert_eq!(results[0].document.title, "Alpha");
    assert_eq!(results[0].chunk.document_id, a);
    assert_eq!(results[1].document.path, "b.md");
    assert!(results.windows(2).all(|w| w[0].score <= w[1].score));

    assert_eq!(store.search(&[1.0, 0.1], 1).await.unwrap().len(), 1);
    assert!(store.search(&[1.0, 0.0, 0.0], 10).await.is_err());
}

#[tokio::test]
async fn test_delete_document_removes_chunks() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let a = store.upsert_document("a.md", "A", "same").await.unwrap();
    let b = store.upsert_document("b.md", "B", "same").await.unwrap();
    store
        .insert_chunks(a, &[embedded(a, 0, "shared text", vec![1.0, 0.0])])
        .await
        .unwrap();
    store
        .insert_chunks(b, &[embedded(b, 0, "shared text", vec![1.0, 0.0])])
        .await
        .unwrap();

    assert!(store.delete_document("a.md").await.unwrap());
    assert!(!store.delete_document("a.md").await.unwrap());
    assert!(store.get_document("a.md").await.unwrap().is_none());

    let results = store.search(&[1.0, 0.0], 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.path, "b.md");
}

#[tokio::test]
async fn test_dimension_change_purges_and_resizes() {
    let tmp = TempDir::new().unwrap();
    let path = db_path(&tmp);

    let (store, _) = SqliteStore::open(&path, 2).await.unwrap();
    let id = store.upsert_document("a.md", "A", "h").await.unwrap();
    store
        .insert_chunks(id, &[embedded(id, 0, "text", vec![1.0, 0.0])])
        .await
        .unwrap();
    store.close().await;

    let (store, change) = SqliteStore::open(&path, 3).await.unwrap();
    assert_eq!(change, DimensionChange::Migrated { previous: 2 });
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.documents, stats.chunks, stats.dimension), (0, 0, 3));
    assert!(store.needs_update("a.md", "h").await.unwrap());
    assert!(store.search(&[1.0, 0.0], 5).await.is_err());

    let id = store.upsert_document("a.md", "A", "h").await.unwrap();
    store
        .insert_chunks(id, &[embedded(id, 0, "text", vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    assert_eq!(store.search(&[1.0, 0.0, 0.0], 5).await.unwrap().len(), 1);
    store.close().await;
}

#[tokio::test]
async fn test_blob_length_is_enforced_by_schema() {
    let tmp = TempDir::new().unwrap();
    let path = db_path(&tmp);
    let (store, _) = SqliteStore::open(&path, 2).await.unwrap();
    let id = store.upsert_document("a.md", "A", "h").await.unwrap();

    let pool = db::connect(&path).await.unwrap();
    let result = sqlx::query(
        "INSERT INTO chunks (document_id, chunk_index, chunk_text, start_offset, end_offset, embedding)
         VALUES (?, 0, 'x', 0, 1, ?)",
    )
    .bind(id)
    .bind(encode_vector(&[1.0, 0.0, 0.0]))
    .execute(&pool)
    .await;
    assert!(result.is_err());
    pool.close().await;
    store.close().await;
}

#[tokio::test]
#[should_panic(expected = "store expects 2")]
async fn test_wrong_width_chunk_panics() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let id = store.upsert_document("a.md", "A", "h").await.unwrap();
    let _ = store
        .insert_chunks(id, &[embedded(id, 0, "text", vec![1.0, 0.0, 0.0])])
        .await;
}

#[tokio::test]
async fn test_replace_document_commits_hash_with_chunks() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();

    let id = store
        .replace_document("a.md", "A", "h1", &[embedded(0, 0, "old", vec![1.0, 0.0])])
        .await
        .unwrap();
    let again = store
        .replace_document(
            "a.md",
            "A v2",
            "h2",
            &[
                embedded(0, 0, "new zero", vec![0.0, 1.0]),
                embedded(0, 1, "new one", vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(id, again);

    let doc = store.get_document("a.md").await.unwrap().unwrap();
    assert_eq!((doc.title.as_str(), doc.content_hash.as_str()), ("A v2", "h2"));
    let texts: Vec<String> = store
        .chunks_for_document(id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(texts, vec!["new zero", "new one"]);
    store.close().await;
}

#[tokio::test]
async fn test_failed_replace_keeps_previous_hash_and_chunks() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let id = store
        .replace_document("a.md", "A", "h1", &[embedded(0, 0, "kept", vec![1.0, 0.0])])
        .await
        .unwrap();

    // Duplicate chunk indices violate UNIQUE(document_id, chunk_index).
    let result = store
        .replace_document(
            "a.md",
            "A v2",
            "h2",
            &[
                embedded(0, 0, "lost", vec![0.0, 1.0]),
                embedded(0, 0, "lost again", vec![0.0, 1.0]),
            ],
        )
        .await;
    assert!(result.is_err());

    let doc = store.get_document("a.md").await.unwrap().unwrap();
    assert_eq!((doc.title.as_str(), doc.content_hash.as_str()), ("A", "h1"));
    assert!(store.needs_update("a.md", "h2").await.unwrap());
    let chunks = store.chunks_for_document(id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "kept");
    store.close().await;
}

fn generation(document_id: i64, g: usize, n: usize) -> Vec<EmbeddedChunk> {
    (0..n)
        .map(|i| embedded(document_id, i, &format!("gen{}-{}", g, i), vec![1.0, i as f32]))
        .collect()
}

fn single_generation(texts: &[String]) -> bool {
    let prefix = |t: &String| t.split('-').next().map(str::to_string);
    texts.iter().all(|t| prefix(t) == prefix(&texts[0]))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_see_whole_chunk_sets() {
    let tmp = TempDir::new().unwrap();
    let (store, _) = SqliteStore::open(&db_path(&tmp), 2).await.unwrap();
    let store = Arc::new(store);
    let id = store
        .replace_document("a.md", "A", "h0", &generation(0, 0, 3))
        .await
        .unwrap();

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for g in 1..=100 {
                let n = if g % 2 == 0 { 3 } else { 5 };
                if g % 3 == 0 {
                    store.insert_chunks(id, &generation(id, g, n)).await.unwrap();
                } else {
                    store
                        .replace_document("a.md", "A", &format!("h{}", g), &generation(0, g, n))
                        .await
                        .unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..60 {
                    let texts: Vec<String> = store
                        .chunks_for_document(id)
                        .await
                        .unwrap()
                        .into_iter()
                        .map(|c| c.text)
                        .collect();
                    assert!(texts.len() == 3 || texts.len() == 5, "{:?}", texts);
                    assert!(single_generation(&texts), "{:?}", texts);

                    let hits: Vec<String> = store
                        .search(&[1.0, 0.0], 100)
                        .await
                        .unwrap()
                        .into_iter()
                        .filter(|r| r.document.path == "a.md")
                        .map(|r| r.chunk.text)
                        .collect();
                    assert!(hits.len() == 3 || hits.len() == 5, "{:?}", hits);
                    assert!(single_generation(&hits), "{:?}", hits);
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    store.close().await;
}

#[tokio::test]
async fn test_open_existing_uses_persisted_dimension() {
    let tmp = TempDir::new().unwrap();
    let path = db_path(&tmp);
    let (store, _) = SqliteStore::open(&path, 3).await.unwrap();
    store
        .replace_document("a.md", "A", "h", &[embedded(0, 0, "text", vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();
    store.close().await;

    let store = SqliteStore::open_existing(&path).await.unwrap();
    assert_eq!(store.dimension().await, 3);
    let stats = store.stats().await.unwrap();
    assert_eq!((stats.documents, stats.chunks, stats.dimension), (1, 1, 3));
    assert!(store.delete_document("a.md").await.unwrap());
    store.close().await;
}

#[tokio::test]
async fn test_open_existing_requires_database() {
    let tmp = TempDir::new().unwrap();
    let path = db_path(&tmp);
    let err = SqliteStore::open_existing(&path).await.err().unwrap();
    assert!(err.to_string().contains("mdsearch init"), "{}", err);
    assert!(!path.exists());
}
