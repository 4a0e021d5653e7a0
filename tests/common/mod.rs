#![allow(dead_code)]

use std::cell::RefCell;

use stockrag::{
    Chunk, ChunkIndex, Chunker, Document, Embed, Generate, IngestStats, Ingestor, RAGError,
    StockLabeler, config::IndexConfig,
};
use tempfile::TempDir;

pub const VOCAB: [&str; 4] = ["營收", "毛利", "股利", "展望"];

/// Counts vocabulary hits; a constant last component keeps vectors non-zero.
pub fn vectorize(text: &str) -> Vec<f32> {
    let mut v: Vec<f32> = VOCAB.iter().map(|k| text.matches(k).count() as f32).collect();
    v.push(0.1);
    v
}

#[derive(Default)]
pub struct KeywordEmbedder {
    pub embedded: Vec<String>,
    pub calls: usize,
    /// Fail every `embed_documents` call from this (zero-based) call onwards.
    pub fail_from_call: Option<usize>,
    /// Reported model name; `keyword-test` when unset.
    pub name: Option<&'static str>,
}

impl KeywordEmbedder {
    pub fn failing_from(call: usize) -> Self {
        Self {
            fail_from_call: Some(call),
            ..Self::default()
        }
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }
}

impl Embed for KeywordEmbedder {
    fn embed_documents(&mut self, texts: &[String]) -> stockrag::Result<Vec<Vec<f32>>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_from_call.is_some_and(|n| call >= n) {
            return Err(RAGError::Embedding("backend unavailable".into()));
        }
        self.embedded.extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| vectorize(t)).collect())
    }

    fn embed_query(&mut self, text: &str) -> stockrag::Result<Vec<f32>> {
        Ok(vectorize(text))
    }

    fn model_name(&self) -> &str {
        self.name.unwrap_or("keyword-test")
    }
}

/// Returns a fixed answer and remembers every prompt.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: RefCell<Vec<String>>,
}

impl Generate for RecordingGenerator {
    fn generate(&self, prompt: &str) -> stockrag::Result<String> {
        let mut prompts = self.prompts.borrow_mut();
        prompts.push(prompt.to_string());
        Ok(format!("answer {}", prompts.len()))
    }
}

pub fn page(source: &str, page: u32, text: &str) -> Document {
    Document {
        source: source.to_string(),
        page,
        text: text.to_string(),
    }
}

pub fn scratch_index() -> (TempDir, IndexConfig) {
    let dir = TempDir::new().unwrap();
    let config = IndexConfig {
        path: dir.path().join("chroma"),
        ..IndexConfig::default()
    };
    (dir, config)
}

/// Prepares and indexes `docs` with the default splitter and stock list.
pub fn ingest(
    docs: &[Document],
    index: &mut ChunkIndex,
    embedder: &mut KeywordEmbedder,
) -> (Vec<Chunk>, IngestStats) {
    let chunker = Chunker::default();
    let labeler = StockLabeler::default();
    let ingestor = Ingestor::new(&chunker, &labeler, 2);
    let chunks = ingestor.prepare(docs);
    let stats = ingestor.index_chunks(&chunks, index, embedder).unwrap();
    (chunks, stats)
}
