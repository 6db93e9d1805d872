//! Evaluation harness through the engine
//!
//! Tests:
//! 1. JSONL test set run end to end, report saved and reloaded
//! 2. Comparing a run against itself finds nothing
//! 3. A worse configuration is reported as a regression
//! 4. A failing query aborts the run with its id

use ragcite_core::config::{Config, StorageConfig};
use ragcite_core::eval::{compare, load_report, save_report, CompareOptions, RegressionKind};
use ragcite_core::llm::{ChatMessage, HashingEmbedder, LLMProvider};
use ragcite_core::{OpenMode, RagEngine, RagError, Result};
use std::path::Path;
use std::sync::Arc;

struct UnusedLLM;

#[async_trait::async_trait]
impl LLMProvider for UnusedLLM {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        panic!("evaluation must not call the LLM");
    }

    fn model_name(&self) -> &str {
        "unused"
    }
}

const CORPUS: &[(&str, &str)] = &[
    ("france", "Paris is the capital of France."),
    ("germany", "Berlin is the capital of Germany and its largest city."),
    ("rust", "Rust guarantees memory safety through ownership and borrowing."),
    ("tea", "Green tea is brewed from unoxidized leaves of the camellia plant."),
];

const TEST_SET: &str = r#"{"query_id": "q1", "query": "What is the capital of France?", "relevant_chunk_ids": ["france#0"]}
{"query_id": "q2", "query": "How does Rust guarantee memory safety?", "relevant_chunk_ids": ["rust#0"]}
{"query_id": "q3", "query": "camellia leaves", "relevant_doc_ids": ["tea#0"]}
"#;

async fn engine(dir: &Path, vector_weight: f64) -> RagEngine {
    let mut config = Config::default();
    config.storage = StorageConfig::in_dir(dir.join("data"));
    config.embedding.dimensions = 128;
    config.retrieval.vector_weight = vector_weight;
    config.retrieval.keyword_weight = 1.0 - vector_weight;
    config.eval.k_values = vec![1, 3];

    let embedder = Arc::new(HashingEmbedder::new(128, config.embedding.model_identifier.clone()));
    let engine = RagEngine::open_with(config, embedder, Arc::new(UnusedLLM), OpenMode::Create).unwrap();
    for (id, text) in CORPUS {
        engine.ingest(id, &format!("{}.txt", id), text).await.unwrap();
    }
    engine
}

#[tokio::test]
async fn test_run_save_and_compare() {
    let dir = tempfile::tempdir().unwrap();
    let test_set = dir.path().join("test_set.jsonl");
    std::fs::write(&test_set, TEST_SET).unwrap();

    let engine = engine(dir.path(), 0.7).await;
    let report = engine.run_evaluation(&test_set, None).await.unwrap();
    assert_eq!(report.query_count, 3);
    assert_eq!(report.settings.k_values, vec![1, 3]);
    assert_eq!(report.mean_recall_at_k[&1], 1.0);
    assert_eq!(report.mrr, 1.0);
    assert!(report.latency_ms.p99 >= report.latency_ms.p50);

    let path = dir.path().join("baseline.json");
    save_report(&path, &report).unwrap();
    let baseline = load_report(&path).unwrap();

    let mut again = engine.run_evaluation(&test_set, None).await.unwrap();
    again.latency_ms = baseline.latency_ms;
    assert!(compare(&baseline, &again, CompareOptions::default()).is_empty());

    let mut worse = again.clone();
    worse.records[0].reciprocal_rank = 0.5;
    worse.mrr = 0.5;
    let regressions = compare(&baseline, &worse, CompareOptions::default());
    assert!(regressions.iter().any(|r| r.kind == RegressionKind::MrrDrop));
    assert!(regressions
        .iter()
        .any(|r| r.kind == RegressionKind::QueryRankDrop && r.metric.contains("q1")));
}

#[tokio::test]
async fn test_explicit_k_values() {
    let dir = tempfile::tempdir().unwrap();
    let test_set = dir.path().join("test_set.jsonl");
    std::fs::write(&test_set, TEST_SET).unwrap();

    let engine = engine(dir.path(), 0.7).await;
    let report = engine
        .run_evaluation(&test_set, Some(&[5, 1]))
        .await
        .unwrap();
    let ks: Vec<usize> = report.mean_recall_at_k.keys().copied().collect();
    assert_eq!(ks, vec![1, 5]);
    assert!(report.records.iter().all(|r| r.retrieved_chunk_ids.len() <= 5));
}

#[tokio::test]
async fn test_invalid_test_set_rejected_before_run() {
    let dir = tempfile::tempdir().unwrap();
    let test_set = dir.path().join("dupes.jsonl");
    std::fs::write(
        &test_set,
        "{\"query_id\": \"q1\", \"query\": \"a\", \"relevant_chunk_ids\": [\"x\"]}\n\
         {\"query_id\": \"q1\", \"query\": \"b\", \"relevant_chunk_ids\": [\"y\"]}\n",
    )
    .unwrap();

    let engine = engine(dir.path(), 0.7).await;
    assert!(matches!(
        engine.run_evaluation(&test_set, None).await,
        Err(RagError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_failing_query_names_query_id() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), 0.7).await;
    let cases = vec![ragcite_core::TestCase {
        query_id: "broken".to_string(),
        query: "capital".to_string(),
        relevant_chunk_ids: vec!["france#0".to_string()],
    }];

    // A retriever whose embedder disagrees with the index dimensions
    let bad = ragcite_core::HybridRetriever::new(
        Arc::new(HashingEmbedder::new(7, "wrong")),
        Arc::new(ragcite_core::VectorIndex::open(dir.path().join("data/vectors"), engine.config().retrieval.metric).unwrap()),
        Arc::new(ragcite_core::KeywordIndex::open(dir.path().join("data/keywords")).unwrap()),
        ragcite_core::FusionWeights::default(),
    );
    let settings = ragcite_core::eval::EvalSettings {
        embedding_model: "wrong".to_string(),
        vector_weight: 0.7,
        keyword_weight: 0.3,
        chunk_size: 800,
        chunk_overlap: 160,
        candidate_k: 20,
        k_values: vec![1],
    };
    let err = ragcite_core::eval::evaluate(&bad, &cases, settings)
        .await
        .unwrap_err();
    match err {
        RagError::Evaluation { query_id, .. } => assert_eq!(query_id, "broken"),
        other => panic!("unexpected error: {}", other),
    }
}
