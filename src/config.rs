//! Configuration for the ingestion and query pipeline.
//!
//! Every field has a default, so an empty (or absent) TOML file yields a working
//! setup that mirrors the `data/` + `chroma/` layout of a typical checkout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RAGError, Result};
use crate::labeling::StockRule;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Directory scanned for PDF reports.
    pub data_path: PathBuf,
    /// Where the ingestion debug dump of all chunks is written.
    pub debug_dump: PathBuf,
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub query: QueryConfig,
    pub stocks: StockConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            debug_dump: PathBuf::from("data.json"),
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            query: QueryConfig::default(),
            stocks: StockConfig::default(),
        }
    }
}

impl RagConfig {
    /// Reads a TOML file; missing keys fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RAGError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: RagConfig = toml::from_str(&raw).map_err(|e| RAGError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the default file if it exists, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    log::debug!("loading config from {}", fallback.display());
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(RAGError::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RAGError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.query.top_k == 0 {
            return Err(RAGError::Config("query.top_k must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RAGError::Config("embedding.batch_size must be > 0".into()));
        }
        Ok(())
    }
}

pub const DEFAULT_CONFIG_FILE: &str = "stockrag.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory owned by the persistent index.
    pub path: PathBuf,
    pub hnsw_max_connections: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Filtered candidate sets up to this size are ranked by an exact scan.
    pub exact_search_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chroma"),
            hnsw_max_connections: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            exact_search_limit: 1024,
        }
    }
}

/// Text splitting, measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Strip CJK punctuation and collapse whitespace before splitting.
    pub clean_text: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 40,
            clean_text: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Model download cache; fastembed's default when unset.
    pub cache_dir: Option<PathBuf>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "multilingual-e5-large".to_string(),
            cache_dir: None,
            batch_size: 32,
        }
    }
}

/// Ollama generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// No timeout when unset.
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "chatglm3".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    /// Label for chunks no rule matches.
    pub unknown: String,
    /// Checked in order; the first pattern found in a chunk's source wins.
    pub rules: Vec<StockRule>,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            unknown: crate::labeling::UNKNOWN_STOCK.to_string(),
            rules: crate::labeling::DEFAULT_STOCKS
                .iter()
                .map(|name| StockRule::same(name))
                .collect(),
        }
    }
}
