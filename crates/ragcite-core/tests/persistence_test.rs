//! Restart behaviour of the persisted stores
//!
//! Tests:
//! 1. Reopened indexes answer identical queries identically
//! 2. Deletes survive a restart
//! 3. Serving refuses missing or corrupt state

use ragcite_core::config::{Config, SimilarityMetric, StorageConfig};
use ragcite_core::index::{KeywordIndex, VectorIndex};
use ragcite_core::llm::{ChatMessage, HashingEmbedder, LLMProvider};
use ragcite_core::{OpenMode, RagEngine, RagError, Result};
use std::path::Path;
use std::sync::Arc;

struct EchoLLM;

#[async_trait::async_trait]
impl LLMProvider for EchoLLM {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok("See [S1].".to_string())
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

const DOCS: &[(&str, &str)] = &[
    ("rust", "Rust ownership rules prevent data races at compile time without a garbage collector."),
    ("python", "Python uses reference counting and a cycle collector for memory management."),
    ("go", "Go schedules goroutines onto operating system threads with a work stealing runtime."),
    ("sqlite", "SQLite stores an entire database in a single cross-platform file on disk."),
];

fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage = StorageConfig::in_dir(dir);
    config.chunking.chunk_size = 48;
    config.chunking.chunk_overlap = 8;
    config.embedding.dimensions = 96;
    config
}

fn open(dir: &Path, mode: OpenMode) -> Result<RagEngine> {
    let config = config(dir);
    let embedder = Arc::new(HashingEmbedder::new(
        config.embedding.dimensions,
        config.embedding.model_identifier.clone(),
    ));
    RagEngine::open_with(config, embedder, Arc::new(EchoLLM), mode)
}

#[tokio::test]
async fn test_reopen_returns_same_results() {
    let dir = tempfile::tempdir().unwrap();
    let queries = ["memory management", "database file", "goroutines threads"];

    let engine = open(dir.path(), OpenMode::Create).unwrap();
    for (id, text) in DOCS {
        engine.ingest(id, &format!("{}.txt", id), text).await.unwrap();
    }
    let mut before = Vec::new();
    for q in queries {
        before.push(engine.retrieve(q, 5).await.unwrap());
    }
    engine.close();

    let engine = open(dir.path(), OpenMode::Existing).unwrap();
    for (q, expected) in queries.iter().zip(&before) {
        let after = engine.retrieve(q, 5).await.unwrap();
        assert_eq!(&after, expected, "results changed for '{}'", q);
    }
}

#[tokio::test]
async fn test_index_level_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = HashingEmbedder::new(32, "hash");
    {
        let vectors = VectorIndex::open(dir.path(), SimilarityMetric::Cosine).unwrap();
        let keywords = KeywordIndex::open(dir.path()).unwrap();
        for (id, text) in DOCS {
            vectors
                .add(
                    id,
                    embedder.embed_text(text),
                    ragcite_core::index::VectorMetadata {
                        document_id: id.to_string(),
                        source_path: id.to_string(),
                        text: text.to_string(),
                        char_span: ragcite_core::index::CharSpan { start: 0, end: text.len() },
                        embedding_key: ragcite_core::db::embedding_key(text, "hash"),
                        model: "hash".to_string(),
                    },
                )
                .unwrap();
            keywords.add(id, id, text).unwrap();
        }
        assert!(vectors.delete("go").unwrap());
        assert!(keywords.delete("go").unwrap());
    }

    let vectors = VectorIndex::open_existing(dir.path(), SimilarityMetric::Cosine).unwrap();
    let keywords = KeywordIndex::open_existing(dir.path()).unwrap();
    assert_eq!(vectors.len().unwrap(), DOCS.len() - 1);

    let query = embedder.embed_text("goroutines threads runtime");
    assert!(vectors
        .query(&query, 10)
        .unwrap()
        .iter()
        .all(|(id, _)| id != "go"));
    assert!(keywords.query("goroutines", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_document_stays_removed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(dir.path(), OpenMode::Create).unwrap();
    for (id, text) in DOCS {
        engine.ingest(id, &format!("{}.txt", id), text).await.unwrap();
    }
    engine.remove_document("sqlite").unwrap();
    engine.close();

    let engine = open(dir.path(), OpenMode::Existing).unwrap();
    let results = engine.retrieve("database file disk", 10).await.unwrap();
    assert!(results.iter().all(|c| c.document_id != "sqlite"));
    assert_eq!(engine.list_documents().unwrap().len(), DOCS.len() - 1);
}

#[test]
fn test_serving_without_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = open(dir.path(), OpenMode::Existing);
    assert!(matches!(result, Err(RagError::IndexMissing(_))));
}

#[test]
fn test_corrupt_index_file_refused() {
    let dir = tempfile::tempdir().unwrap();
    open(dir.path(), OpenMode::Create).unwrap().close();

    let path = VectorIndex::file_path(config(dir.path()).storage.vector_dir());
    std::fs::write(&path, b"definitely not a sqlite database").unwrap();
    for suffix in ["-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }

    let result = open(dir.path(), OpenMode::Existing);
    assert!(
        matches!(result, Err(RagError::IndexCorrupt { .. }) | Err(RagError::Database(_))),
        "unexpected: {:?}",
        result.err()
    );
}
