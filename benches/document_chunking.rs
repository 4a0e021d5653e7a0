use criterion::{Criterion, criterion_group, criterion_main};

use stockrag::{Chunker, Document, StockLabeler, assign_chunk_ids};

fn synthetic_report(source: &str, pages: u32) -> Vec<Document> {
    let paragraph = "鴻海第三季營收創新高，毛利率提升至 6.5%。AI 伺服器出貨動能強勁，\n\
                     法人預期明年獲利成長。\n\n";
    (0..pages)
        .map(|page| Document {
            source: source.to_string(),
            page,
            text: paragraph.repeat(20),
        })
        .collect()
}

fn bench_split_for(c: &mut Criterion, name: &str, pages: u32) {
    let docs = synthetic_report("data/鴻海_2024Q3.pdf", pages);
    let chunker = Chunker::default();
    let labeler = StockLabeler::default();

    c.bench_function(name, |b| {
        b.iter(|| {
            let mut chunks = chunker.split_documents(std::hint::black_box(&docs));
            assign_chunk_ids(&mut chunks);
            labeler.assign(&mut chunks);
            chunks
        })
    });
}

fn bench_split_small(c: &mut Criterion) {
    bench_split_for(c, "split_10_pages", 10);
}

fn bench_split_large(c: &mut Criterion) {
    bench_split_for(c, "split_200_pages", 200);
}

criterion_group! {
    name = chunk_benches;
    config = Criterion::default().sample_size(10);
    targets =
        bench_split_small,
        bench_split_large
}

criterion_main!(chunk_benches);
