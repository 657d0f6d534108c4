//! TOML configuration for mdsearch.
//!
//! The file (by default `./config/mdsearch.toml`) has four sections:
//!
//! ```toml
//! [embeddings]
//! enabled = true
//! provider = "openai"            # openai | ollama | voyage
//! api_key = "${OPENAI_API_KEY}"
//! db_path = "embeddings.db"
//!
//! [chunking]
//! max_size = 1500
//! overlap_size = 150
//!
//! [search]
//! limit = 20
//!
//! [[directories]]
//! path = "docs"
//! include_globs = ["**/README.md"]
//! ```
//!
//! Every section is optional. `api_key`, `base_url` and `db_path` expand
//! `$VAR` and `${VAR}` references; unset variables expand to nothing.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mdsearch_core::chunk::{ChunkOptions, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_OVERLAP_SIZE};

pub const DEFAULT_CONFIG_PATH: &str = "./config/mdsearch.toml";
pub const DEFAULT_DB_PATH: &str = "embeddings.db";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub directories: Vec<DirectoryConfig>,
}

/// Which embedding backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Ollama,
    Voyage,
}

impl ProviderKind {
    /// Model used when the configuration leaves `model` empty.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => crate::embedding::openai::DEFAULT_MODEL,
            ProviderKind::Ollama => crate::embedding::ollama::DEFAULT_MODEL,
            ProviderKind::Voyage => crate::embedding::voyage::DEFAULT_MODEL,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            "voyage" | "voyageai" => Ok(ProviderKind::Voyage),
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, or voyage.",
                other
            ),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Voyage => "voyage",
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: String::new(),
            model: String::new(),
            api_key: String::new(),
            base_url: String::new(),
            db_path: default_db_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

impl EmbeddingsConfig {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        self.provider.parse()
    }

    /// Configured model, or the provider's default when empty.
    pub fn model_or_default(&self) -> Result<String> {
        if self.model.trim().is_empty() {
            Ok(self.provider_kind()?.default_model().to_string())
        } else {
            Ok(self.model.trim().to_string())
        }
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }

    /// Expand environment references and fill empty fields with defaults.
    fn resolve(&mut self) -> Result<()> {
        self.api_key = expand_env(&self.api_key);
        self.base_url = expand_env(&self.base_url);
        self.db_path = expand_env(&self.db_path);

        let kind = self.provider_kind()?;
        self.provider = kind.to_string();
        self.model = self.model_or_default()?;
        if self.db_path.trim().is_empty() {
            self.db_path = default_db_path();
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

fn default_max_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}
fn default_overlap_size() -> usize {
    DEFAULT_OVERLAP_SIZE
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions::new(self.max_size, self.overlap_size)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    20
}

/// A directory tree the loader scans for markdown files.
#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/README.md".to_string()]
}

/// Expand `$VAR` / `${VAR}` references; unset variables become empty.
pub fn expand_env(value: &str) -> String {
    shellexpand::env_with_context_no_errors(value, |var| {
        Some(std::env::var(var).unwrap_or_default())
    })
    .into_owned()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse, resolve and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;

    config.embeddings.resolve()?;

    if config.chunking.max_size > 0 && config.chunking.overlap_size >= config.chunking.max_size {
        bail!(
            "chunking.overlap_size ({}) must be smaller than chunking.max_size ({})",
            config.chunking.overlap_size,
            config.chunking.max_size
        );
    }

    if config.search.limit < 1 {
        bail!("search.limit must be >= 1");
    }

    if config.embeddings.timeout_secs == 0 {
        bail!("embeddings.timeout_secs must be > 0");
    }

    Ok(config)
}
