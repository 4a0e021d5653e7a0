//! Retrieval-augmented question answering over PDF stock reports.
//!
//! Ingestion splits every PDF page into chunks, gives each chunk a positional id
//! (`source:page:index`), tags it with the stock its file name refers to and stores only
//! the chunks the index does not have yet. Queries embed the question, retrieve the
//! closest chunks of one stock and hand them to a language model.

pub mod chunking;
pub mod config;
pub mod document;
pub mod dump;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod indexing;
pub mod labeling;
pub mod pipeline;
pub mod query;
pub mod spinner;

pub use chunking::{Chunk, ChunkId, ChunkMetadata, Chunker, assign_chunk_ids};
pub use config::RagConfig;
pub use document::{Document, grab_all_documents};
pub use embedding::{Embed, Embedder};
pub use error::{RAGError, Result};
pub use generation::{Generate, OllamaGenerator};
pub use indexing::{ChunkIndex, IndexEntry, partition_chunks};
pub use labeling::{StockLabeler, StockRule};
pub use pipeline::{IngestPlan, IngestStats, Ingestor};
pub use query::{QueryResponse, QueryRouter};
