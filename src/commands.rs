//! CLI command implementations. Each prints its result to stdout.

use anyhow::{bail, Result};

use mdsearch_core::models::DimensionChange;
use mdsearch_core::store::VectorStore;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::context::{AppContext, Engine};
use crate::embedding::EmbeddingProvider;
use crate::search::HitOrigin;
use crate::sqlite_store::SqliteStore;

pub async fn run_init(config: &Config) -> Result<()> {
    let (engine, change) = Engine::open(&config.embeddings).await?;
    let stats = engine.store.stats().await?;

    println!("init");
    println!("  database: {}", config.embeddings.db_path);
    println!(
        "  model: {} ({} dimensions)",
        engine.provider.model_name(),
        stats.dimension
    );
    match change {
        DimensionChange::Unchanged => println!("  schema up to date"),
        DimensionChange::Initialized => println!("  schema created"),
        DimensionChange::Migrated { previous } => println!(
            "  dimension changed from {} to {}; existing documents were purged",
            previous, stats.dimension
        ),
    }
    println!("  documents: {}", stats.documents);
    println!("  chunks: {}", stats.chunks);

    engine.store.close().await;
    Ok(())
}

pub async fn run_index(config: Config, force: bool, cancel: &CancelToken) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let report = ctx.index_all(force, cancel).await?;

    println!("index{}", if force { " (forced)" } else { "" });
    println!("  documents: {}", ctx.catalogue.len());
    println!("  indexed: {}", report.indexed);
    println!("  skipped: {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("  chunks written: {}", report.chunks);
    if report.cancelled {
        println!("  cancelled before completion");
    }

    if report.failed > 0 {
        bail!("{} document(s) failed to index", report.failed);
    }
    Ok(())
}

pub async fn run_search(
    config: Config,
    query: &str,
    limit: Option<usize>,
    cancel: &CancelToken,
) -> Result<()> {
    let limit = limit.unwrap_or(config.search.limit);
    let ctx = AppContext::open(config).await?;
    let hits = ctx.search(query, limit, cancel).await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        match &hit.origin {
            HitOrigin::Vector {
                score,
                chunk_text,
                section_title,
            } => {
                println!("{}. [{:.4}] {}", i + 1, score, hit.title);
                println!("    path: {}", hit.path);
                if !section_title.is_empty() {
                    println!("    section: {}", section_title);
                }
                println!("    > {}", snippet(chunk_text, 200));
            }
            HitOrigin::Text => {
                println!("{}. [text] {}", i + 1, hit.title);
                println!("    path: {}", hit.path);
                if !hit.overview.is_empty() {
                    println!("    > {}", snippet(&hit.overview, 200));
                }
            }
        }
        println!();
    }
    Ok(())
}

pub async fn run_chunks(config: &Config, path: &str) -> Result<()> {
    let store = SqliteStore::open_existing(&config.embeddings.db_path()).await?;

    let Some(doc) = store.get_document(path).await? else {
        store.close().await;
        bail!("Document not indexed: {}", path);
    };
    let chunks = store.chunks_for_document(doc.id).await?;

    println!("{} ({})", doc.title, doc.path);
    println!("  hash: {}", doc.content_hash);
    println!("  updated: {}", doc.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  chunks: {}", chunks.len());
    for chunk in &chunks {
        println!();
        println!(
            "--- chunk {} [{}..{}] {}",
            chunk.index, chunk.start_offset, chunk.end_offset, chunk.section_title
        );
        println!("{}", chunk.text);
    }

    store.close().await;
    Ok(())
}

pub async fn run_remove(config: &Config, path: &str) -> Result<()> {
    let store = SqliteStore::open_existing(&config.embeddings.db_path()).await?;
    let removed = store.delete_document(path).await?;
    store.close().await;

    if removed {
        println!("removed {}", path);
        Ok(())
    } else {
        bail!("Document not indexed: {}", path)
    }
}

/// First `max` characters of `text` on one line.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}
