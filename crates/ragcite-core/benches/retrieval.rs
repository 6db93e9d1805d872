//! Retrieval performance benchmarks
//!
//! Measures performance of:
//! - BM25 keyword queries
//! - Vector queries
//! - Hybrid retrieval with fusion

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ragcite_core::config::SimilarityMetric;
use ragcite_core::db::DocumentStore;
use ragcite_core::index::{Chunker, IngestPipeline, KeywordIndex, VectorIndex};
use ragcite_core::llm::{Embedder, HashingEmbedder};
use ragcite_core::search::{FusionWeights, HybridRetriever};
use std::sync::Arc;
use tokio::runtime::Runtime;

const SAMPLE_DOCS: &[(&str, &str)] = &[
    (
        "rust-intro",
        "Rust is a systems programming language focused on safety, speed, and concurrency.",
    ),
    (
        "rust-ownership",
        "Ownership is Rust's most unique feature. It enables Rust to make memory safety guarantees.",
    ),
    (
        "rust-async",
        "Rust has first-class support for async programming with async/await syntax.",
    ),
    (
        "python-intro",
        "Python is a high-level programming language known for its simplicity and readability.",
    ),
    (
        "python-async",
        "Python's asyncio provides infrastructure for writing concurrent code using async/await.",
    ),
    (
        "go-concurrency",
        "Go's goroutines make concurrent programming simple and efficient with built-in support.",
    ),
];

struct Fixture {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorIndex>,
    keywords: Arc<KeywordIndex>,
}

fn setup(rt: &Runtime, copies: usize) -> Fixture {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256, "bench-hash"));
    let vectors = Arc::new(VectorIndex::open_in_memory(SimilarityMetric::Cosine).unwrap());
    let keywords = Arc::new(KeywordIndex::open_in_memory().unwrap());
    let pipeline = IngestPipeline::new(
        Chunker::new(64, 16).unwrap(),
        embedder.clone(),
        Arc::new(DocumentStore::open_in_memory().unwrap()),
        vectors.clone(),
        keywords.clone(),
    );

    rt.block_on(async {
        for copy in 0..copies {
            for (id, text) in SAMPLE_DOCS {
                let text = format!("{} Revision {}.", text, copy);
                pipeline
                    .ingest(&format!("{}-{}", id, copy), id, &text)
                    .await
                    .unwrap();
            }
        }
    });

    Fixture {
        embedder,
        vectors,
        keywords,
    }
}

fn bench_keyword_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let fixture = setup(&rt, 20);
    let mut group = c.benchmark_group("keyword_query");

    for (name, query) in [
        ("single_word", "rust"),
        ("two_words", "async programming"),
        ("phrase", "memory safety guarantees"),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |b, query| {
            b.iter(|| fixture.keywords.query(black_box(query), 10).unwrap());
        });
    }
    group.finish();
}

fn bench_vector_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let fixture = setup(&rt, 20);
    let query = rt
        .block_on(fixture.embedder.embed("concurrent programming"))
        .unwrap();

    c.bench_function("vector_query", |b| {
        b.iter(|| fixture.vectors.query(black_box(&query), 10).unwrap());
    });
}

fn bench_hybrid_retrieve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hybrid_retrieve");

    for copies in [5, 20, 50] {
        let fixture = setup(&rt, copies);
        let retriever = HybridRetriever::new(
            fixture.embedder.clone(),
            fixture.vectors.clone(),
            fixture.keywords.clone(),
            FusionWeights::default(),
        );
        group.bench_with_input(
            BenchmarkId::from_parameter(copies * SAMPLE_DOCS.len()),
            &retriever,
            |b, retriever| {
                b.iter(|| {
                    rt.block_on(retriever.retrieve(black_box("async programming"), 5))
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_keyword_query,
    bench_vector_query,
    bench_hybrid_retrieve
);
criterion_main!(benches);
