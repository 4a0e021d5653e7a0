use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use hnsw_rs::filter::FilterT;
use hnsw_rs::prelude::*;
use rayon::{
    iter::{IntoParallelRefIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use serde::{Deserialize, Serialize};

use crate::chunking::{Chunk, ChunkId, ChunkMetadata};
use crate::config::IndexConfig;
use crate::embedding::Embed;
use crate::error::{RAGError, Result};

const INDEX_FILE: &str = "index.json";
const MAX_LAYERS: usize = 16;
const MIN_GRAPH_CAPACITY: usize = 1024;

/// One persisted chunk. Written once, never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    pub fn stock(&self) -> Option<&str> {
        self.metadata.stock.as_deref()
    }
}

#[derive(Deserialize)]
struct IndexFile {
    model: Option<String>,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    model: Option<&'a str>,
    dimension: Option<usize>,
    entries: &'a [IndexEntry],
}

/// A search hit; `distance` is cosine distance, lower is closer.
#[derive(Debug, Clone, Copy)]
pub struct ScoredEntry<'a> {
    pub entry: &'a IndexEntry,
    pub distance: f32,
}

/// Persistent vector index keyed by [`ChunkId`].
///
/// Entries live in `<dir>/index.json`. The HNSW graph is in memory only and is built
/// the first time a search needs it.
pub struct ChunkIndex {
    dir: PathBuf,
    config: IndexConfig,
    model: Option<String>,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
    id_to_idx: HashMap<ChunkId, usize>,
    graph: OnceLock<Graph>,
}

struct Graph {
    hnsw: Hnsw<'static, f32, DistCosine>,
    capacity: usize,
}

impl ChunkIndex {
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let dir = config.path.clone();
        let file_path = dir.join(INDEX_FILE);

        let stored = if file_path.is_file() {
            let file = fs::File::open(&file_path).map_err(|e| RAGError::FileRead {
                path: file_path.clone(),
                source: e,
            })?;
            let stored: IndexFile = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                RAGError::CorruptIndex {
                    path: file_path.clone(),
                    reason: e.to_string(),
                }
            })?;
            Some(stored)
        } else {
            None
        };

        let (model, dimension, entries) = match stored {
            Some(s) => (s.model, s.dimension, s.entries),
            None => (None, None, Vec::new()),
        };

        let mut id_to_idx = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            if let Some(expected) = dimension {
                if entry.embedding.len() != expected {
                    return Err(RAGError::CorruptIndex {
                        path: file_path,
                        reason: format!(
                            "entry {} has dimension {}, index declares {}",
                            entry.id,
                            entry.embedding.len(),
                            expected
                        ),
                    });
                }
            }
            id_to_idx.insert(entry.id.clone(), idx);
        }

        log::info!("opened index at {} with {} entries", dir.display(), entries.len());
        Ok(Self {
            dir,
            config: config.clone(),
            model,
            dimension,
            entries,
            id_to_idx,
            graph: OnceLock::new(),
        })
    }

    /// Deletes the whole persisted index directory.
    pub fn reset(path: &Path) -> Result<()> {
        if path.exists() {
            log::info!("removing index directory {}", path.display());
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Embedding model the stored vectors came from, if any were stored.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Rejects an embedder other than the one the stored vectors came from.
    pub fn check_model(&self, model: &str) -> Result<()> {
        match self.model.as_deref() {
            Some(stored) if stored != model => Err(RAGError::Config(format!(
                "index at {} holds vectors from embedding model {}, not {}; reingest with --reset",
                self.dir.display(),
                stored,
                model
            ))),
            _ => Ok(()),
        }
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.id_to_idx.contains_key(id)
    }

    pub fn existing_ids(&self) -> HashSet<ChunkId> {
        self.id_to_idx.keys().cloned().collect()
    }

    pub fn get(&self, id: &ChunkId) -> Option<&IndexEntry> {
        self.id_to_idx.get(id).map(|&idx| &self.entries[idx])
    }

    /// Stores chunks with their precomputed vectors and persists the index.
    ///
    /// Chunks whose id is already present are skipped. Returns how many were written.
    pub fn add(&mut self, chunks: &[&Chunk], embeddings: Vec<Vec<f32>>, model: &str) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(RAGError::Embedding(format!(
                "{} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        self.check_model(model)?;

        // validate the whole batch before touching any state
        let mut dimension = self.dimension;
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            let id = chunk.id().cloned().ok_or_else(|| RAGError::MissingChunkId {
                source_path: chunk.metadata.source.clone(),
                page: chunk.metadata.page,
            })?;
            if embedding.is_empty() {
                return Err(RAGError::EmptyEmbeddings);
            }
            match dimension {
                Some(expected) if expected != embedding.len() => {
                    return Err(RAGError::DimensionMismatch {
                        expected,
                        got: embedding.len(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(embedding.len()),
            }
            ids.push(id);
        }
        self.dimension = dimension;

        let mut added = 0;
        for ((chunk, id), embedding) in chunks.iter().zip(ids).zip(embeddings) {
            if self.id_to_idx.contains_key(&id) {
                log::debug!("skipping already indexed chunk {}", id);
                continue;
            }

            let idx = self.entries.len();
            self.id_to_idx.insert(id.clone(), idx);
            self.entries.push(IndexEntry {
                id,
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            });
            added += 1;
        }

        if self.model.is_none() {
            self.model = Some(model.to_string());
        }
        self.grow_graph(added);
        self.persist()?;
        Ok(added)
    }

    /// Embeds and stores `chunks` in batches, persisting after every batch.
    ///
    /// Not atomic across batches: on failure the batches already written stay, and a
    /// rerun skips them because their ids are present.
    pub fn embed_and_store<E: Embed + ?Sized>(
        &mut self,
        embedder: &mut E,
        chunks: &[&Chunk],
        batch_size: usize,
    ) -> Result<usize> {
        self.check_model(embedder.model_name())?;
        let mut added = 0;
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = embedder.embed_documents(&texts)?;
            added += self.add(batch, vectors, embedder.model_name())?;
            log::debug!("stored batch of {} ({} total)", batch.len(), added);
        }
        Ok(added)
    }

    /// The `k` entries closest to `query` among those labelled `stock`, best first.
    pub fn similarity_search(&self, query: &[f32], k: usize, stock: &str) -> Result<Vec<ScoredEntry<'_>>> {
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(RAGError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        let candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| (e.stock() == Some(stock)).then_some(idx))
            .collect();
        if candidates.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let hits = if candidates.len() <= self.config.exact_search_limit {
            self.exact_search(query, k, &candidates)
        } else {
            self.graph_search(query, k, &candidates)
        };
        Ok(hits)
    }

    fn exact_search(&self, query: &[f32], k: usize, candidates: &[usize]) -> Vec<ScoredEntry<'_>> {
        let mut scored: Vec<(usize, f32)> = candidates
            .par_iter()
            .map(|&idx| (idx, cosine_distance(query, &self.entries[idx].embedding)))
            .collect();

        // stable: equal distances keep insertion order
        scored.par_sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(idx, distance)| ScoredEntry {
                entry: &self.entries[idx],
                distance,
            })
            .collect()
    }

    fn graph_search(&self, query: &[f32], k: usize, candidates: &[usize]) -> Vec<ScoredEntry<'_>> {
        // candidates are ascending, as the Vec filter requires
        let allowed: Vec<usize> = candidates.to_vec();
        let ef = self.config.hnsw_ef_search.max(k);
        let filter: &dyn FilterT = &allowed;
        let graph = self.graph.get_or_init(|| {
            let capacity = (self.entries.len() * 2).max(MIN_GRAPH_CAPACITY);
            log::debug!("building HNSW graph over {} entries", self.entries.len());
            Graph {
                hnsw: build_graph(&self.config, &self.entries, capacity),
                capacity,
            }
        });
        let mut neighbours = graph.hnsw.search_filter(query, k, ef, Some(filter));
        neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbours
            .into_iter()
            .filter_map(|n| {
                self.entries.get(n.d_id).map(|entry| ScoredEntry {
                    entry,
                    distance: n.distance,
                })
            })
            .take(k)
            .collect()
    }

    // An unbuilt graph stays unbuilt; an outgrown one is dropped and rebuilt on demand.
    fn grow_graph(&mut self, added: usize) {
        if added == 0 {
            return;
        }
        let Some(graph) = self.graph.get_mut() else {
            return;
        };
        if self.entries.len() > graph.capacity {
            log::debug!("dropping HNSW graph outgrown at {} entries", self.entries.len());
            self.graph.take();
            return;
        }
        let first_new = self.entries.len() - added;
        for (idx, entry) in self.entries.iter().enumerate().skip(first_new) {
            graph.hnsw.insert((&entry.embedding[..], idx));
        }
    }

    fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));

        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(
            &mut writer,
            &IndexFileRef {
                model: self.model.as_deref(),
                dimension: self.dimension,
                entries: &self.entries,
            },
        )?;
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &target)?;
        log::debug!("persisted {} entries to {}", self.entries.len(), target.display());
        Ok(())
    }
}

fn build_graph(config: &IndexConfig, entries: &[IndexEntry], capacity: usize) -> Hnsw<'static, f32, DistCosine> {
    let graph = Hnsw::new(
        config.hnsw_max_connections,
        capacity,
        MAX_LAYERS,
        config.hnsw_ef_construction,
        DistCosine {},
    );
    for (idx, entry) in entries.iter().enumerate() {
        graph.insert((&entry.embedding[..], idx));
    }
    graph
}

/// Result of diffing freshly split chunks against the ids already stored.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub already_indexed: Vec<&'a Chunk>,
    /// Later chunks repeating an id seen earlier in the same run.
    pub duplicates: Vec<&'a Chunk>,
    pub to_insert: Vec<&'a Chunk>,
}

/// Splits `chunks` into those whose id is already stored and those to insert.
///
/// Every chunk must carry an id. Order within each group follows the input.
pub fn partition_chunks<'a>(existing: &HashSet<ChunkId>, chunks: &'a [Chunk]) -> Result<Partition<'a>> {
    let mut partition = Partition::default();
    let mut seen: HashSet<&ChunkId> = HashSet::new();

    for chunk in chunks {
        let id = chunk.id().ok_or_else(|| RAGError::MissingChunkId {
            source_path: chunk.metadata.source.clone(),
            page: chunk.metadata.page,
        })?;
        if existing.contains(id) {
            partition.already_indexed.push(chunk);
        } else if !seen.insert(id) {
            partition.duplicates.push(chunk);
        } else {
            partition.to_insert.push(chunk);
        }
    }
    Ok(partition)
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut na = 0.0;
    let mut nb = 0.0;

    for i in 0..a.len().min(b.len()) {
        dot += a[i] * b[i];
        na += a[i] * a[i];
        nb += b[i] * b[i];
    }

    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}
