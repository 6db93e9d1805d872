//! Ragcite Core Library
//!
//! Question answering over a small document corpus with citation-grounded
//! synthesis.
//!
//! # Features
//! - Deterministic overlapping character chunker
//! - Pluggable embedding providers behind an LRU + TTL cache
//! - Persistent vector and BM25 keyword indexes on SQLite
//! - Hybrid retrieval with min-max normalized weighted fusion
//! - LLM synthesis with citation validation, retry and a degraded fallback
//! - Offline evaluation (Recall@k, MRR, latency percentiles) with baseline comparison

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod eval;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod search;
pub mod synth;

pub use config::{Config, LLMServiceConfig};
pub use db::{Database, DocumentStore, DocumentSummary, SessionStore, SessionSummary, SessionTurn};
pub use engine::{EngineStatus, OpenMode, RagEngine};
pub use error::{Error, ProviderError, ProviderErrorKind, RagError, Result};
pub use eval::{compare, CompareOptions, MetricsReport, Regression, TestCase};
pub use index::{Chunk, Chunker, IngestReport, IngestStatus, KeywordIndex, VectorIndex};
pub use llm::{
    CachedEmbedder, ChatMessage, Embedder, EmbeddingCache, HashingEmbedder, HttpEmbedder,
    HttpLLMClient, LLMProvider, RetryPolicy,
};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use search::{FusionWeights, HybridRetriever, RetrievedCandidate};
pub use synth::{Answer, AnswerMode, Citation, SynthesisOutcome, Synthesizer};

/// Default data directory name
pub const DATA_DIR_NAME: &str = "ragcite";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "ragcite";
