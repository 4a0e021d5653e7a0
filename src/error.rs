use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RAGError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file at {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse PDF {path}: {source}")]
    PdfParse {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding model initialization failed: {0}")]
    ModelInit(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Generation request failed: {0}")]
    Generation(#[from] reqwest::Error),

    #[error("Generation backend returned {status}: {body}")]
    GenerationStatus { status: u16, body: String },

    #[error("Empty embeddings vector")]
    EmptyEmbeddings,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid chunk id: {0}")]
    InvalidChunkId(String),

    #[error("Chunk has no id assigned (source {source_path}, page {page})")]
    MissingChunkId { source_path: String, page: u32 },

    #[error("Index at {path} is corrupt: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, RAGError>;
