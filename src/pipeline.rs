//! Ingestion: documents → chunks → ids → stock labels → diff → insert.

use crate::chunking::{Chunk, Chunker, assign_chunk_ids};
use crate::document::Document;
use crate::embedding::Embed;
use crate::error::Result;
use crate::indexing::{ChunkIndex, Partition, partition_chunks};
use crate::labeling::StockLabeler;

/// Counts reported after an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Entries in the index before this run.
    pub existing: usize,
    pub chunks: usize,
    pub already_indexed: usize,
    pub duplicates: usize,
    pub added: usize,
}

/// The diff of one run: which chunks are new and which are skipped.
#[derive(Debug)]
pub struct IngestPlan<'c> {
    existing: usize,
    chunks: usize,
    partition: Partition<'c>,
}

impl IngestPlan<'_> {
    /// Entries in the index when the plan was made.
    pub fn existing(&self) -> usize {
        self.existing
    }

    /// Chunks that will be embedded and stored.
    pub fn pending(&self) -> usize {
        self.partition.to_insert.len()
    }
}

pub struct Ingestor<'a> {
    chunker: &'a Chunker,
    labeler: &'a StockLabeler,
    batch_size: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(chunker: &'a Chunker, labeler: &'a StockLabeler, batch_size: usize) -> Self {
        Self {
            chunker,
            labeler,
            batch_size,
        }
    }

    /// Splits, identifies and labels documents without touching any index.
    pub fn prepare(&self, docs: &[Document]) -> Vec<Chunk> {
        let mut chunks = self.chunker.split_documents(docs);
        assign_chunk_ids(&mut chunks);
        self.labeler.assign(&mut chunks);
        log::info!("split {} pages into {} chunks", docs.len(), chunks.len());
        chunks
    }

    /// Diffs `chunks` against the ids already stored, without embedding anything.
    pub fn plan<'c>(&self, chunks: &'c [Chunk], index: &ChunkIndex) -> Result<IngestPlan<'c>> {
        let existing_ids = index.existing_ids();
        let partition = partition_chunks(&existing_ids, chunks)?;
        if !partition.duplicates.is_empty() {
            log::warn!(
                "{} chunks repeat an id from earlier in this run and are skipped",
                partition.duplicates.len()
            );
        }
        Ok(IngestPlan {
            existing: existing_ids.len(),
            chunks: chunks.len(),
            partition,
        })
    }

    /// Embeds and stores the chunks a plan marked for insertion.
    pub fn apply<E: Embed>(
        &self,
        plan: IngestPlan<'_>,
        index: &mut ChunkIndex,
        embedder: &mut E,
    ) -> Result<IngestStats> {
        let added = if plan.partition.to_insert.is_empty() {
            0
        } else {
            index.embed_and_store(embedder, &plan.partition.to_insert, self.batch_size)?
        };

        Ok(IngestStats {
            existing: plan.existing,
            chunks: plan.chunks,
            already_indexed: plan.partition.already_indexed.len(),
            duplicates: plan.partition.duplicates.len(),
            added,
        })
    }

    /// Inserts the chunks whose id is not yet in `index`.
    pub fn index_chunks<E: Embed>(
        &self,
        chunks: &[Chunk],
        index: &mut ChunkIndex,
        embedder: &mut E,
    ) -> Result<IngestStats> {
        let plan = self.plan(chunks, index)?;
        self.apply(plan, index, embedder)
    }
}
