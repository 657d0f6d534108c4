//! Application context: configuration, document catalogue and the optional
//! embedding engine, built once at startup and passed explicitly.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use mdsearch_core::models::{DimensionChange, SourceDocument};

use crate::cancel::CancelToken;
use crate::config::{Config, EmbeddingsConfig};
use crate::embedding::{create_provider, Embedder, EmbeddingProvider};
use crate::index::{IndexReport, Indexer};
use crate::search::{HybridSearch, SearchHit};
use crate::sources::load_documents;
use crate::sqlite_store::SqliteStore;

/// Vector store plus the provider whose dimension it was opened with.
pub struct Engine {
    pub store: SqliteStore,
    pub provider: Embedder,
}

impl Engine {
    /// Build the provider, then open the store at its dimension.
    pub async fn open(config: &EmbeddingsConfig) -> Result<(Self, DimensionChange)> {
        let provider = create_provider(config).context("Failed to create embedding provider")?;
        let (store, change) = SqliteStore::open(&config.db_path(), provider.dimension()).await?;
        info!(
            provider = %config.provider,
            model = provider.model_name(),
            dimension = provider.dimension(),
            "embedding engine ready"
        );
        Ok((Self { store, provider }, change))
    }
}

pub struct AppContext {
    pub config: Config,
    pub catalogue: Vec<SourceDocument>,
    pub engine: Option<Engine>,
}

impl AppContext {
    /// Load the catalogue and, when embeddings are enabled, open the engine.
    ///
    /// An engine that fails to open is logged and left out, so search still
    /// works through the text fallback.
    pub async fn open(config: Config) -> Result<Self> {
        let catalogue = load_documents(&config)?;
        info!(documents = catalogue.len(), "catalogue loaded");

        let engine = if config.embeddings.enabled {
            match Engine::open(&config.embeddings).await {
                Ok((engine, _)) => Some(engine),
                Err(err) => {
                    warn!(error = %format!("{:#}", err), "embeddings unavailable, using text search only");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            catalogue,
            engine,
        })
    }

    pub fn engine(&self) -> Result<&Engine> {
        match &self.engine {
            Some(engine) => Ok(engine),
            None => bail!("Embeddings are not available. Set [embeddings] enabled = true in config."),
        }
    }

    pub async fn index_all(&self, force: bool, cancel: &CancelToken) -> Result<IndexReport> {
        let engine = self.engine()?;
        let indexer = Indexer::new(
            &engine.store,
            &engine.provider,
            self.config.chunking.options(),
        );
        Ok(indexer.index_all(&self.catalogue, force, cancel).await)
    }

    pub async fn search(&self, query: &str, limit: usize, cancel: &CancelToken) -> Vec<SearchHit> {
        let search = HybridSearch::new(&self.catalogue);
        let search = match &self.engine {
            Some(engine) => search.with_engine(&engine.store, &engine.provider),
            None => search,
        };
        search.search(query, limit, cancel).await
    }
}
