use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::document::{Document, preprocess_text};
use crate::error::RAGError;

/// Position of a chunk: `{source}:{page}:{index}`.
///
/// `index` counts chunks within one page in splitter emission order, so the id is only
/// stable as long as splitting is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub source: String,
    pub page: u32,
    pub index: usize,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.page, self.index)
    }
}

impl FromStr for ChunkId {
    type Err = RAGError;

    // split from the right, sources may contain ':'
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RAGError::InvalidChunkId(s.to_string());
        let mut parts = s.rsplitn(3, ':');
        let index = parts.next().ok_or_else(invalid)?;
        let page = parts.next().ok_or_else(invalid)?;
        let source = parts.next().ok_or_else(invalid)?;
        Ok(Self {
            source: source.to_string(),
            page: page.parse().map_err(|_| invalid())?,
            index: index.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ChunkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            content: content.into(),
            metadata: ChunkMetadata {
                source: source.into(),
                page,
                id: None,
                stock: None,
            },
        }
    }

    pub fn id(&self) -> Option<&ChunkId> {
        self.metadata.id.as_ref()
    }

    pub fn stock(&self) -> Option<&str> {
        self.metadata.stock.as_deref()
    }
}

/// Writes `{source}:{page}:{index}` into each chunk's metadata.
///
/// `index` restarts at 0 whenever `(source, page)` differs from the previous chunk and
/// increments otherwise. Callers must keep chunks of one page contiguous; an interleaved
/// page restarts its numbering and produces colliding ids.
pub fn assign_chunk_ids(chunks: &mut [Chunk]) {
    let mut last_page: Option<(String, u32)> = None;
    let mut index = 0usize;

    for chunk in chunks.iter_mut() {
        let source = &chunk.metadata.source;
        let page = chunk.metadata.page;

        let same_page = last_page
            .as_ref()
            .is_some_and(|(s, p)| s == source && *p == page);
        if same_page {
            index += 1;
        } else {
            index = 0;
            last_page = Some((source.clone(), page));
        }

        chunk.metadata.id = Some(ChunkId {
            source: source.clone(),
            page,
            index,
        });
    }
}

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter.
///
/// Splits on the first separator present in the text, merges the pieces back up to
/// `chunk_size` characters carrying up to `chunk_overlap` characters between neighbours,
/// and recurses with the next separator into any piece that is still too long. The
/// separator stays attached to the start of the piece that follows it.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    clean_text: bool,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(400, 40)
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            clean_text: false,
        }
    }

    pub fn from_config(config: &crate::config::ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap).with_clean_text(config.clean_text)
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn with_clean_text(mut self, clean_text: bool) -> Self {
        self.clean_text = clean_text;
        self
    }

    /// Splits each page, keeping page order and each page's chunks contiguous.
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in docs {
            let text = if self.clean_text {
                preprocess_text(&doc.text)
            } else {
                doc.text.clone()
            };
            chunks.extend(
                self.split_text(&text)
                    .into_iter()
                    .map(|content| Chunk::new(content, doc.source.clone(), doc.page)),
            );
        }
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }
            if remaining.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }
        out
    }

    // Pieces already carry their separators, so they are joined with nothing.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if total > self.chunk_size {
                    log::warn!(
                        "created a chunk of {} characters, longer than {}",
                        total,
                        self.chunk_size
                    );
                }
                push_trimmed(&mut docs, window.concat());
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    let first = window.remove(0);
                    total -= char_len(first);
                }
            }
            window.push(piece);
            total += len;
        }
        push_trimmed(&mut docs, window.concat());
        docs
    }
}

fn push_trimmed(docs: &mut Vec<String>, doc: String) {
    let trimmed = doc.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on `separator`, gluing each separator to the start of the following piece.
/// An empty separator splits into single characters. Empty pieces are dropped.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(text[start..pos].to_string());
        }
        // the separator itself opens the next piece
        start = pos;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}
