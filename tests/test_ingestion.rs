mod common;

use common::{KeywordEmbedder, ingest, page, scratch_index};
use stockrag::{
    Chunk, ChunkIndex, Chunker, Ingestor, RAGError, StockLabeler, assign_chunk_ids,
    partition_chunks,
};

fn reports() -> Vec<stockrag::Document> {
    vec![
        page("data/鴻海_2024Q3.pdf", 0, "營收 創新高"),
        page("data/鴻海_2024Q3.pdf", 1, "毛利 改善"),
        page("data/群聯_2024Q3.pdf", 0, "股利 政策"),
    ]
}

#[test]
fn second_run_over_same_documents_adds_nothing() {
    let (_dir, config) = scratch_index();
    let docs = reports();

    let mut index = ChunkIndex::open(&config).unwrap();
    let mut embedder = KeywordEmbedder::default();
    let (_, first) = ingest(&docs, &mut index, &mut embedder);
    assert_eq!(first.existing, 0);
    assert_eq!(first.added, 3);

    let mut index = ChunkIndex::open(&config).unwrap();
    let mut embedder = KeywordEmbedder::default();
    let (_, second) = ingest(&docs, &mut index, &mut embedder);
    assert_eq!(second.existing, 3);
    assert_eq!(second.already_indexed, 3);
    assert_eq!(second.added, 0);
    assert!(embedder.embedded.is_empty());
    assert_eq!(embedder.calls, 0);
}

#[test]
fn new_document_inserts_only_its_chunks() {
    let (_dir, config) = scratch_index();
    let mut docs = reports();

    let mut index = ChunkIndex::open(&config).unwrap();
    ingest(&docs, &mut index, &mut KeywordEmbedder::default());

    docs.push(page("data/緯穎_2024Q3.pdf", 0, "展望 樂觀"));
    docs.push(page("data/緯穎_2024Q3.pdf", 1, "營收 展望"));

    let mut index = ChunkIndex::open(&config).unwrap();
    let mut embedder = KeywordEmbedder::default();
    let (_, stats) = ingest(&docs, &mut index, &mut embedder);

    assert_eq!(stats.added, 2);
    assert_eq!(embedder.embedded, vec!["展望 樂觀", "營收 展望"]);
    assert_eq!(index.len(), 5);
    let new_entry = index
        .get(&"data/緯穎_2024Q3.pdf:1:0".parse().unwrap())
        .unwrap();
    assert_eq!(new_entry.stock(), Some("緯穎"));
}

#[test]
fn index_survives_reopen() {
    let (_dir, config) = scratch_index();
    let mut index = ChunkIndex::open(&config).unwrap();
    let (chunks, _) = ingest(&reports(), &mut index, &mut KeywordEmbedder::default());
    drop(index);

    let reopened = ChunkIndex::open(&config).unwrap();
    assert_eq!(reopened.len(), chunks.len());
    assert_eq!(reopened.dimension(), Some(5));
    for chunk in &chunks {
        let entry = reopened.get(chunk.id().unwrap()).unwrap();
        assert_eq!(entry.content, chunk.content);
        assert_eq!(entry.metadata, chunk.metadata);
    }
}

#[test]
fn failed_batch_keeps_earlier_batches_and_retry_fills_the_rest() {
    let (_dir, config) = scratch_index();
    let docs = vec![
        page("data/智崴.pdf", 0, "營收"),
        page("data/智崴.pdf", 1, "毛利"),
        page("data/智崴.pdf", 2, "股利"),
        page("data/智崴.pdf", 3, "展望"),
        page("data/智崴.pdf", 4, "營收 毛利"),
    ];

    // batch size 2: the second batch fails
    let mut index = ChunkIndex::open(&config).unwrap();
    let chunker = Chunker::default();
    let labeler = StockLabeler::default();
    let ingestor = Ingestor::new(&chunker, &labeler, 2);
    let chunks = ingestor.prepare(&docs);
    let err = ingestor
        .index_chunks(&chunks, &mut index, &mut KeywordEmbedder::failing_from(1))
        .unwrap_err();
    assert!(matches!(err, RAGError::Embedding(_)));

    let mut index = ChunkIndex::open(&config).unwrap();
    assert_eq!(index.len(), 2);

    let mut embedder = KeywordEmbedder::default();
    let stats = ingestor
        .index_chunks(&chunks, &mut index, &mut embedder)
        .unwrap();
    assert_eq!(stats.already_indexed, 2);
    assert_eq!(stats.added, 3);
    assert_eq!(embedder.embedded, vec!["股利", "展望", "營收 毛利"]);
    assert_eq!(index.len(), 5);
}

#[test]
fn duplicate_ids_in_one_run_keep_the_first_chunk() {
    let mut chunks = vec![
        Chunk::new("first", "a.pdf", 0),
        Chunk::new("other page", "a.pdf", 1),
        Chunk::new("second", "a.pdf", 0),
    ];
    assign_chunk_ids(&mut chunks);

    let partition = partition_chunks(&Default::default(), &chunks).unwrap();
    let inserted: Vec<_> = partition.to_insert.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(inserted, vec!["first", "other page"]);
    assert_eq!(partition.duplicates.len(), 1);
    assert_eq!(partition.duplicates[0].content, "second");
}

#[test]
fn partition_requires_ids() {
    let chunks = vec![Chunk::new("no id", "a.pdf", 0)];
    assert!(matches!(
        partition_chunks(&Default::default(), &chunks),
        Err(RAGError::MissingChunkId { .. })
    ));
}

#[test]
fn reset_removes_the_index_directory() {
    let (_dir, config) = scratch_index();
    let mut index = ChunkIndex::open(&config).unwrap();
    ingest(&reports(), &mut index, &mut KeywordEmbedder::default());
    assert!(config.path.exists());

    ChunkIndex::reset(&config.path).unwrap();
    assert!(!config.path.exists());
    assert!(ChunkIndex::open(&config).unwrap().is_empty());

    // resetting a missing directory is fine
    ChunkIndex::reset(&config.path).unwrap();
}

#[test]
fn vectors_of_another_dimension_are_rejected() {
    let (_dir, config) = scratch_index();
    let mut index = ChunkIndex::open(&config).unwrap();
    ingest(&reports(), &mut index, &mut KeywordEmbedder::default());

    let mut chunks = vec![Chunk::new("x", "data/new.pdf", 0)];
    assign_chunk_ids(&mut chunks);
    let refs: Vec<&Chunk> = chunks.iter().collect();
    let err = index.add(&refs, vec![vec![1.0, 0.0]], "other").unwrap_err();
    assert!(matches!(
        err,
        RAGError::DimensionMismatch {
            expected: 5,
            got: 2
        }
    ));
}

#[test]
fn corrupt_index_file_is_reported() {
    let (_dir, config) = scratch_index();
    std::fs::create_dir_all(&config.path).unwrap();
    std::fs::write(config.path.join("index.json"), "{ not json").unwrap();
    assert!(matches!(
        ChunkIndex::open(&config),
        Err(RAGError::CorruptIndex { .. })
    ));
}

#[test]
fn plan_counts_pending_chunks_and_apply_stores_exactly_those() {
    let (_dir, config) = scratch_index();
    let mut index = ChunkIndex::open(&config).unwrap();
    ingest(&reports()[..1], &mut index, &mut KeywordEmbedder::default());

    let chunker = Chunker::default();
    let labeler = StockLabeler::default();
    let ingestor = Ingestor::new(&chunker, &labeler, 2);
    let chunks = ingestor.prepare(&reports());
    let plan = ingestor.plan(&chunks, &index).unwrap();
    assert_eq!(plan.existing(), 1);
    assert_eq!(plan.pending(), 2);

    let mut embedder = KeywordEmbedder::default();
    let stats = ingestor.apply(plan, &mut index, &mut embedder).unwrap();
    assert_eq!(stats.existing, 1);
    assert_eq!(stats.already_indexed, 1);
    assert_eq!(stats.added, 2);
    assert_eq!(embedder.embedded, vec!["毛利 改善", "股利 政策"]);
    assert_eq!(index.len(), 3);
}

#[test]
fn another_embedding_model_is_refused_before_embedding() {
    let (_dir, config) = scratch_index();
    let mut index = ChunkIndex::open(&config).unwrap();
    ingest(&reports()[..1], &mut index, &mut KeywordEmbedder::default());

    let chunker = Chunker::default();
    let labeler = StockLabeler::default();
    let ingestor = Ingestor::new(&chunker, &labeler, 2);
    let chunks = ingestor.prepare(&reports());
    let mut other = KeywordEmbedder::named("other-model");
    let err = ingestor
        .index_chunks(&chunks, &mut index, &mut other)
        .unwrap_err();

    assert!(matches!(err, RAGError::Config(_)));
    assert_eq!(other.calls, 0);
    assert_eq!(index.len(), 1);
    assert_eq!(index.model(), Some("keyword-test"));
}
