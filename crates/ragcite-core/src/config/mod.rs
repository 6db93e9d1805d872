//! Configuration management

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tolerance used when checking that fusion weights sum to 1.0
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// LLM service configuration for answer synthesis
    #[serde(default)]
    pub llm: LLMServiceConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub eval: EvalConfig,
}

/// Chunker settings, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    160
}

/// Which embedding provider to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// In-process feature hashing, no network
    Local,
    /// OpenAI-compatible `/v1/embeddings` endpoint
    Http,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,

    /// Identifier stored with every vector; changing it forces re-embedding
    #[serde(default = "default_embedding_model")]
    pub model_identifier: String,

    /// Vector dimensions (local provider; remote providers report their own)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Base URL of the embeddings service
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_api_key", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model_identifier: default_embedding_model(),
            dimensions: default_dimensions(),
            url: default_embedding_url(),
            api_key: default_embedding_api_key(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Local
}

fn default_embedding_model() -> String {
    "local-hash-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_embedding_url() -> String {
    std::env::var("RAGCITE_EMBEDDING_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

fn default_embedding_api_key() -> Option<String> {
    std::env::var("RAGCITE_EMBEDDING_API_KEY").ok()
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    32
}

/// Similarity function used by the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Self::Cosine),
            "inner_product" => Some(Self::InnerProduct),
            _ => None,
        }
    }
}

/// Hybrid retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum depth requested from each index before fusion
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_metric")]
    pub metric: SimilarityMetric,
    #[serde(default = "default_index_timeout_ms")]
    pub index_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            metric: default_metric(),
            index_timeout_ms: default_index_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_top_k() -> usize {
    5
}

fn default_candidate_k() -> usize {
    20
}

fn default_metric() -> SimilarityMetric {
    SimilarityMetric::Cosine
}

fn default_index_timeout_ms() -> u64 {
    5_000
}

/// Embedding cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Retry settings for LLM calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_seconds: default_backoff_base(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    1.0
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the LLM service for chat/completions
    #[serde(default = "default_llm_url")]
    pub url: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    /// API key (optional, for authenticated services)
    #[serde(default = "default_llm_api_key", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in seconds, applied per attempt
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_chat_model(),
            api_key: default_llm_api_key(),
            timeout_secs: default_llm_timeout(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

impl LLMServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_llm_url() -> String {
    std::env::var("RAGCITE_LLM_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

fn default_chat_model() -> String {
    std::env::var("RAGCITE_LLM_MODEL")
        .unwrap_or_else(|_| "meta-llama/Llama-3.1-8B-Instruct".to_string())
}

fn default_llm_api_key() -> Option<String> {
    std::env::var("RAGCITE_LLM_API_KEY").ok()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

/// Prompt assembly and degraded-mode rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Upper bound on source text sent to the LLM, in characters
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
    /// Excerpt length per passage in a degraded answer
    #[serde(default = "default_degraded_excerpt")]
    pub degraded_excerpt_chars: usize,
    /// Earlier turns of a session replayed into the prompt
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            context_budget_chars: default_context_budget(),
            degraded_excerpt_chars: default_degraded_excerpt(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_context_budget() -> usize {
    12_000
}

fn default_degraded_excerpt() -> usize {
    500
}

fn default_history_turns() -> usize {
    5
}

/// On-disk locations of the persisted stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub vector_dir: Option<PathBuf>,
    #[serde(default)]
    pub keyword_dir: Option<PathBuf>,
    #[serde(default)]
    pub corpus_dir: Option<PathBuf>,
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vector_dir: None,
            keyword_dir: None,
            corpus_dir: None,
            session_dir: None,
        }
    }
}

impl StorageConfig {
    /// Storage rooted at a single directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            vector_dir: None,
            keyword_dir: None,
            corpus_dir: None,
            session_dir: None,
        }
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.vector_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("vectors"))
    }

    pub fn keyword_dir(&self) -> PathBuf {
        self.keyword_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("keywords"))
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.corpus_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("corpus"))
    }

    pub fn session_dir(&self) -> PathBuf {
        self.session_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sessions"))
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("RAGCITE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::DATA_DIR_NAME)
        })
}

/// Evaluation harness defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_k_values")]
    pub k_values: Vec<usize>,
    /// Allowed drop in mean recall / MRR before a regression is reported
    #[serde(default)]
    pub recall_tolerance: f64,
    /// Allowed relative p95 latency growth (0.5 = 50% slower)
    #[serde(default = "default_latency_ratio")]
    pub latency_regression_ratio: f64,
    /// p95 growth in milliseconds that must also be exceeded
    #[serde(default = "default_latency_min_ms")]
    pub latency_regression_min_ms: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k_values: default_k_values(),
            recall_tolerance: 0.0,
            latency_regression_ratio: default_latency_ratio(),
            latency_regression_min_ms: default_latency_min_ms(),
        }
    }
}

fn default_k_values() -> Vec<usize> {
    vec![1, 3, 5, 10]
}

fn default_latency_ratio() -> f64 {
    0.5
}

fn default_latency_min_ms() -> f64 {
    5.0
}

/// Validate a pair of fusion weights
pub fn validate_weights(vector: f64, keyword: f64) -> Result<()> {
    let in_range = |w: f64| w.is_finite() && (0.0..=1.0).contains(&w);
    if !in_range(vector) || !in_range(keyword) || ((vector + keyword) - 1.0).abs() > WEIGHT_EPSILON
    {
        return Err(RagError::InvalidWeights { vector, keyword });
    }
    Ok(())
}

impl Config {
    /// Load config from the default path (or `RAGCITE_CONFIG`)
    pub fn load() -> Result<Self> {
        let path = std::env::var("RAGCITE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self::load_from(&path)
    }

    /// Load config from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "Loaded configuration");
            config
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Fail fast on settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be > 0".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be < chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }

        validate_weights(self.retrieval.vector_weight, self.retrieval.keyword_weight)?;

        if self.retrieval.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be > 0".into()));
        }
        if self.embedding.model_identifier.trim().is_empty() {
            return Err(RagError::InvalidConfig(
                "embedding.model_identifier must not be empty".into(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(RagError::InvalidConfig(
                "embedding.dimensions must be > 0".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::InvalidConfig(
                "embedding.batch_size must be > 0".into(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(RagError::InvalidConfig("cache.capacity must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagError::InvalidConfig(
                "retry.max_attempts must be >= 1".into(),
            ));
        }
        let base = self.retry.backoff_base_seconds;
        if !base.is_finite() || base < 0.0 {
            return Err(RagError::InvalidConfig(format!(
                "retry.backoff_base_seconds must be a non-negative number, got {}",
                base
            )));
        }
        if self.eval.k_values.iter().any(|&k| k == 0) {
            return Err(RagError::InvalidConfig("eval.k_values must be > 0".into()));
        }
        Ok(())
    }
}
