//! End-to-end hybrid retrieval scenarios
//!
//! Tests:
//! 1. Labelled query ranks its passage first (Recall@5 = MRR = 1.0)
//! 2. A purely lexical match surfaces only while the keyword weight is non-zero
//! 3. Fusion arithmetic for single-list and both-list chunks

use async_trait::async_trait;
use ragcite_core::config::SimilarityMetric;
use ragcite_core::db::embedding_key;
use ragcite_core::eval::{evaluate, EvalSettings, TestCase};
use ragcite_core::index::{CharSpan, KeywordIndex, VectorIndex, VectorMetadata};
use ragcite_core::llm::{Embedder, HashingEmbedder};
use ragcite_core::search::{FusionWeights, HybridRetriever};
use ragcite_core::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Returns fixed vectors for known texts
struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| vec![0.0, 1.0, 0.0]))
            .collect())
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

fn metadata(chunk_id: &str, text: &str, model: &str) -> VectorMetadata {
    VectorMetadata {
        document_id: chunk_id.to_string(),
        source_path: format!("{}.txt", chunk_id),
        text: text.to_string(),
        char_span: CharSpan {
            start: 0,
            end: text.chars().count(),
        },
        embedding_key: embedding_key(text, model),
        model: model.to_string(),
    }
}

fn add_chunk(
    vectors: &VectorIndex,
    keywords: &KeywordIndex,
    chunk_id: &str,
    text: &str,
    vector: Vec<f32>,
    model: &str,
) {
    vectors
        .add(chunk_id, vector, metadata(chunk_id, text, model))
        .unwrap();
    keywords.add(chunk_id, chunk_id, text).unwrap();
}

const RARE_QUERY: &str = "zyxqua";

/// Five chunks where only `D` contains the query term and has no semantic overlap
fn sensitivity_corpus() -> (Arc<dyn Embedder>, Arc<VectorIndex>, Arc<KeywordIndex>) {
    let vectors = Arc::new(VectorIndex::open_in_memory(SimilarityMetric::Cosine).unwrap());
    let keywords = Arc::new(KeywordIndex::open_in_memory().unwrap());
    let chunks: [(&str, &str, Vec<f32>); 5] = [
        ("A", "alpha beta", vec![1.0, 0.0, 0.0]),
        ("B", "gamma delta", vec![0.3, 0.954, 0.0]),
        ("C", "epsilon kappa", vec![0.2, 0.98, 0.0]),
        ("D", "the zyxqua token", vec![0.0, 0.0, 1.0]),
        ("E", "lambda omicron", vec![0.0, 1.0, 0.0]),
    ];
    for (id, text, vector) in chunks {
        add_chunk(&vectors, &keywords, id, text, vector, "stub");
    }

    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder {
        vectors: HashMap::from([(RARE_QUERY.to_string(), vec![1.0, 0.0, 0.0])]),
    });
    (embedder, vectors, keywords)
}

fn ids(candidates: &[ragcite_core::RetrievedCandidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.chunk_id.as_str()).collect()
}

#[tokio::test]
async fn test_capital_of_france_ranks_first() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128, "hash-test"));
    let vectors = Arc::new(VectorIndex::open_in_memory(SimilarityMetric::Cosine).unwrap());
    let keywords = Arc::new(KeywordIndex::open_in_memory().unwrap());

    let corpus = [
        ("chunkA", "Paris is the capital of France."),
        ("chunkB", "Berlin is a large city in Germany."),
        ("chunkC", "Rust ownership prevents data races at compile time."),
        ("chunkD", "The Loire valley is known for its castles and wine."),
    ];
    for (id, text) in corpus {
        let vector = embedder.embed(text).await.unwrap();
        add_chunk(&vectors, &keywords, id, text, vector, "hash-test");
    }

    let retriever = HybridRetriever::new(embedder, vectors, keywords, FusionWeights::default());
    let cases = vec![TestCase {
        query_id: "q1".to_string(),
        query: "What is the capital of France?".to_string(),
        relevant_chunk_ids: vec!["chunkA".to_string()],
    }];
    let settings = EvalSettings {
        embedding_model: "hash-test".to_string(),
        vector_weight: 0.7,
        keyword_weight: 0.3,
        chunk_size: 800,
        chunk_overlap: 160,
        candidate_k: 20,
        k_values: vec![5],
    };

    let report = evaluate(&retriever, &cases, settings).await.unwrap();
    let record = &report.records[0];
    assert_eq!(record.retrieved_chunk_ids[0], "chunkA");
    assert_eq!(record.recall_at_k[&5], 1.0);
    assert_eq!(record.reciprocal_rank, 1.0);
    assert_eq!(report.mean_recall_at_k[&5], 1.0);
    assert_eq!(report.mrr, 1.0);
}

#[tokio::test]
async fn test_lexical_only_match_needs_keyword_weight() {
    let (embedder, vectors, keywords) = sensitivity_corpus();

    let hybrid = HybridRetriever::new(
        embedder.clone(),
        vectors.clone(),
        keywords.clone(),
        FusionWeights::default(),
    );
    let top = hybrid.retrieve(RARE_QUERY, 2).await.unwrap();
    assert_eq!(ids(&top), vec!["A", "D"]);

    let vector_only = HybridRetriever::new(
        embedder,
        vectors,
        keywords,
        FusionWeights::new(1.0, 0.0).unwrap(),
    );
    let top = vector_only.retrieve(RARE_QUERY, 2).await.unwrap();
    assert_eq!(ids(&top), vec!["A", "B"]);
    assert!(!ids(&top).contains(&"D"));
}

#[tokio::test]
async fn test_fused_scores_follow_weights() {
    let (embedder, vectors, keywords) = sensitivity_corpus();
    let retriever = HybridRetriever::new(embedder, vectors, keywords, FusionWeights::default());
    let all = retriever.retrieve(RARE_QUERY, 5).await.unwrap();

    let a = &all[0];
    assert_eq!(a.chunk_id, "A");
    assert!((a.fused_score - 0.7 * a.vector_score).abs() < 1e-9);
    assert_eq!(a.keyword_score, 0.0);

    let d = all.iter().find(|c| c.chunk_id == "D").unwrap();
    assert_eq!(d.keyword_score, 1.0);
    assert!((d.fused_score - (0.7 * d.vector_score + 0.3)).abs() < 1e-9);

    let ranks: Vec<usize> = all.iter().map(|c| c.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    assert!(all.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
}

#[test]
fn test_weights_must_sum_to_one() {
    assert!(FusionWeights::new(0.5, 0.3).is_err());
    assert!(FusionWeights::new(0.0, 1.0).is_ok());
}
