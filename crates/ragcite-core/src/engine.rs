//! Query facade over the whole pipeline
//!
//! [`RagEngine`] owns the stores, the cached embedder, the retriever, the
//! synthesizer and the session history, and is what the CLI and other
//! collaborators talk to.

use crate::config::{Config, EmbeddingProviderKind};
use crate::db::{
    validate_session_id, DocumentStore, DocumentSummary, SessionStore, SessionSummary, SessionTurn,
};
use crate::error::{RagError, Result};
use crate::eval::{evaluate, load_test_set, EvalSettings, MetricsReport};
use crate::index::{Chunker, IngestPipeline, IngestReport, KeywordIndex, VectorIndex};
use crate::llm::{
    build_embedder, build_llm, CacheStats, CachedEmbedder, Embedder, EmbeddingCache, LLMProvider,
    RetryPolicy, RetryStats, RetryStatsSnapshot, RetryingEmbedder,
};
use crate::metrics::{MetricsSnapshot, PipelineMetrics, Stage};
use crate::search::{HybridRetriever, RetrievedCandidate};
use crate::synth::{Answer, QueryState, QueryStateMachine, Synthesizer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// How stores are opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create missing stores (ingestion)
    Create,
    /// Require existing, validated stores (serving and evaluation)
    Existing,
}

/// Counts and statistics reported by [`RagEngine::status`]
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub documents: usize,
    pub chunks: usize,
    pub vector_entries: usize,
    pub keyword_entries: usize,
    pub embedding_model: String,
    pub dimensions: Option<usize>,
    pub vector_path: PathBuf,
    pub keyword_path: PathBuf,
    pub corpus_path: PathBuf,
    pub session_path: PathBuf,
    pub cache: CacheStats,
    /// Retries of LLM calls during synthesis
    pub retry: RetryStatsSnapshot,
    /// Retries of embedding provider calls
    pub embedding_retry: RetryStatsSnapshot,
    pub metrics: MetricsSnapshot,
}

pub struct RagEngine {
    config: Config,
    documents: Arc<DocumentStore>,
    vectors: Arc<VectorIndex>,
    keywords: Arc<KeywordIndex>,
    sessions: SessionStore,
    cache: Arc<EmbeddingCache>,
    retriever: HybridRetriever,
    ingest: IngestPipeline,
    synthesizer: Synthesizer,
    metrics: Arc<PipelineMetrics>,
    embedding_retry: Arc<RetryStats>,
    next_query_id: AtomicU64,
}

impl RagEngine {
    /// Open for ingestion, creating stores as needed
    pub fn open(config: Config) -> Result<Self> {
        let embedder = build_embedder(&config.embedding)?;
        let llm = build_llm(&config.llm)?;
        Self::open_with(config, embedder, llm, OpenMode::Create)
    }

    /// Open validated, existing stores for queries and evaluation
    pub fn open_for_serving(config: Config) -> Result<Self> {
        let embedder = build_embedder(&config.embedding)?;
        let llm = build_llm(&config.llm)?;
        Self::open_with(config, embedder, llm, OpenMode::Existing)
    }

    /// Open with explicit providers
    pub fn open_with(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMProvider>,
        mode: OpenMode,
    ) -> Result<Self> {
        config.validate()?;
        let storage = &config.storage;
        let metric = config.retrieval.metric;

        let (documents, vectors, keywords) = match mode {
            OpenMode::Create => (
                DocumentStore::open(storage.corpus_dir())?,
                VectorIndex::open(storage.vector_dir(), metric)?,
                KeywordIndex::open(storage.keyword_dir())?,
            ),
            OpenMode::Existing => (
                DocumentStore::open_existing(storage.corpus_dir())?,
                VectorIndex::open_existing(storage.vector_dir(), metric)?,
                KeywordIndex::open_existing(storage.keyword_dir())?,
            ),
        };
        let documents = Arc::new(documents);
        let vectors = Arc::new(vectors);
        let keywords = Arc::new(keywords);

        if mode == OpenMode::Existing {
            validate_for_serving(&config, &documents, &vectors, &keywords)?;
        }
        let sessions = SessionStore::open(storage.session_dir())?;

        // provider <- retry <- cache: cache hits never reach the retry loop
        let embedding_retry = Arc::new(RetryStats::default());
        let policy = RetryPolicy::from_config(&config.retry)
            .with_attempt_timeout(Duration::from_secs(config.embedding.timeout_secs.max(1)));
        let embedder: Arc<dyn Embedder> = Arc::new(
            RetryingEmbedder::new(embedder, policy).with_stats(embedding_retry.clone()),
        );
        let cache = Arc::new(EmbeddingCache::new(config.cache.capacity, config.cache.ttl()));
        let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(embedder, cache.clone()));
        let metrics = Arc::new(PipelineMetrics::new());

        let retriever = HybridRetriever::from_config(
            &config.retrieval,
            embedder.clone(),
            vectors.clone(),
            keywords.clone(),
        )?;
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let ingest = IngestPipeline::new(
            chunker,
            embedder,
            documents.clone(),
            vectors.clone(),
            keywords.clone(),
        )
        .with_batch_size(config.embedding.batch_size);
        let synthesizer = Synthesizer::from_config(&config, llm)
            .with_metrics(metrics.clone())
            .with_retry_stats(Arc::new(RetryStats::default()));

        tracing::info!(
            mode = ?mode,
            data_dir = %storage.data_dir.display(),
            model = %config.embedding.model_identifier,
            "Opened engine"
        );

        Ok(Self {
            config,
            documents,
            vectors,
            keywords,
            sessions,
            cache,
            retriever,
            ingest,
            synthesizer,
            metrics,
            embedding_retry,
            next_query_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Ingest already-redacted text
    pub async fn ingest(
        &self,
        document_id: &str,
        source_path: &str,
        raw_text: &str,
    ) -> Result<IngestReport> {
        let start = Instant::now();
        let result = self.ingest.ingest(document_id, source_path, raw_text).await;
        self.metrics
            .record(Stage::Embedding, start.elapsed(), result.is_ok());
        result
    }

    /// Remove a document and its chunks from every store
    pub fn remove_document(&self, document_id: &str) -> Result<()> {
        if self.ingest.remove(document_id)? {
            Ok(())
        } else {
            Err(RagError::DocumentNotFound(document_id.to_string()))
        }
    }

    pub fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.documents.list_documents()
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let storage = &self.config.storage;
        Ok(EngineStatus {
            documents: self.documents.count_documents()?,
            chunks: self.documents.count_chunks()?,
            vector_entries: self.vectors.len()?,
            keyword_entries: self.keywords.len()?,
            embedding_model: self.config.embedding.model_identifier.clone(),
            dimensions: self.vectors.dimensions()?,
            vector_path: VectorIndex::file_path(storage.vector_dir()),
            keyword_path: KeywordIndex::file_path(storage.keyword_dir()),
            corpus_path: DocumentStore::file_path(storage.corpus_dir()),
            session_path: SessionStore::file_path(storage.session_dir()),
            cache: self.cache.stats(),
            retry: self.synthesizer.retry_stats().snapshot(),
            embedding_retry: self.embedding_retry.snapshot(),
            metrics: self.metrics.snapshot(),
        })
    }

    /// Ranked candidates without synthesis
    pub async fn retrieve(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedCandidate>> {
        validate_query(text, top_k)?;
        self.retriever.retrieve(text, top_k).await
    }

    /// Answer `text` from the top `top_k` passages
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Answer> {
        self.query_with_session(text, top_k, None).await
    }

    /// Answer `text`, continuing `session_id` when given.
    ///
    /// Recent turns of the session go into the prompt as conversation, never
    /// as citable sources, and the answer is appended to the session.
    pub async fn query_with_session(
        &self,
        text: &str,
        top_k: usize,
        session_id: Option<&str>,
    ) -> Result<Answer> {
        validate_query(text, top_k)?;
        if let Some(id) = session_id {
            validate_session_id(id)?;
        }
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!("query", query_id, top_k, session = session_id.unwrap_or(""));
        self.answer(text, top_k, session_id).instrument(span).await
    }

    async fn answer(&self, text: &str, top_k: usize, session_id: Option<&str>) -> Result<Answer> {
        let start = Instant::now();
        let history = match session_id {
            Some(id) => self
                .sessions
                .history(id, self.config.synthesis.history_turns)?,
            None => Vec::new(),
        };
        let mut state = QueryStateMachine::new(self.config.retry.max_attempts);
        let result = self.run_query(text, top_k, &history, &mut state).await;
        self.metrics.record(Stage::Query, start.elapsed(), result.is_ok());

        match result {
            Ok(mut answer) => {
                answer.latency_ms = start.elapsed().as_millis() as u64;
                tracing::info!(
                    mode = answer.mode.as_str(),
                    citations = answer.citations.len(),
                    history_turns = history.len(),
                    latency_ms = answer.latency_ms,
                    "Query answered"
                );
                if let Some(id) = session_id {
                    self.sessions
                        .add_turn(id, text, &answer.text, answer.mode.as_str())?;
                }
                Ok(answer)
            }
            Err(e) => {
                state.fail();
                tracing::warn!(state = %state.state(), error = %e, "Query failed");
                Err(e)
            }
        }
    }

    /// Turns of a session, oldest first
    pub fn session_history(&self, session_id: &str, limit: usize) -> Result<Vec<SessionTurn>> {
        validate_session_id(session_id)?;
        self.sessions.history(session_id, limit)
    }

    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        self.sessions.list_sessions(limit)
    }

    /// Forget a session. Fails with `SessionNotFound` if it has no turns.
    pub fn delete_session(&self, session_id: &str) -> Result<usize> {
        match self.sessions.delete_session(session_id)? {
            0 => Err(RagError::SessionNotFound(session_id.to_string())),
            n => Ok(n),
        }
    }

    async fn run_query(
        &self,
        text: &str,
        top_k: usize,
        history: &[SessionTurn],
        state: &mut QueryStateMachine,
    ) -> Result<Answer> {
        state.transition(QueryState::Embedding)?;
        let t = Instant::now();
        let embedding = self.retriever.embed_query(text).await;
        self.metrics
            .record(Stage::Embedding, t.elapsed(), embedding.is_ok());
        let embedding = match embedding {
            Ok(embedding) => Some(embedding),
            Err(e) if is_provider_outage(&e) => {
                tracing::warn!(error = %e, "Query embedding unavailable, ranking by keywords only");
                self.metrics.record_keyword_fallback();
                None
            }
            Err(e) => return Err(e),
        };

        state.transition(QueryState::Retrieving)?;
        let t = Instant::now();
        let candidates = match &embedding {
            Some(embedding) => {
                self.retriever
                    .retrieve_with_embedding(text, embedding.as_deref(), top_k)
                    .await
            }
            None => self.retriever.retrieve_keyword_only(text, top_k).await,
        };
        self.metrics
            .record(Stage::Retrieval, t.elapsed(), candidates.is_ok());
        let candidates = candidates?;
        tracing::debug!(candidates = candidates.len(), "Retrieved candidates");

        self.synthesizer
            .run_with_history(text, history, &candidates, state)
            .await
            .into_result()
    }

    /// Evaluate retrieval against a labelled test set
    pub async fn run_evaluation(
        &self,
        test_set_path: &Path,
        k_values: Option<&[usize]>,
    ) -> Result<MetricsReport> {
        let cases = load_test_set(test_set_path)?;
        let settings = EvalSettings {
            embedding_model: self.config.embedding.model_identifier.clone(),
            vector_weight: self.config.retrieval.vector_weight,
            keyword_weight: self.config.retrieval.keyword_weight,
            chunk_size: self.config.chunking.chunk_size,
            chunk_overlap: self.config.chunking.chunk_overlap,
            candidate_k: self.config.retrieval.candidate_k,
            k_values: k_values
                .map(<[usize]>::to_vec)
                .unwrap_or_else(|| self.config.eval.k_values.clone()),
        };
        evaluate(&self.retriever, &cases, settings).await
    }

    /// Release the cache. Stores are closed on drop.
    pub fn close(self) {
        let stats = self.cache.stats();
        tracing::info!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate,
            "Closing engine"
        );
        self.cache.close();
    }
}

/// Provider failures that retries could not get past
fn is_provider_outage(error: &RagError) -> bool {
    matches!(error, RagError::AllRetriesFailed { .. }) || error.is_transient()
}

fn validate_query(text: &str, top_k: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::InvalidInput("query text must not be empty".into()));
    }
    if top_k == 0 {
        return Err(RagError::InvalidInput("top_k must be > 0".into()));
    }
    Ok(())
}

/// Refuse to serve indexes built with another model or out of sync
fn validate_for_serving(
    config: &Config,
    documents: &DocumentStore,
    vectors: &VectorIndex,
    keywords: &KeywordIndex,
) -> Result<()> {
    let model = &config.embedding.model_identifier;
    let models = vectors.models()?;
    if models.iter().any(|m| m != model) {
        return Err(RagError::InvalidConfig(format!(
            "vector index holds embeddings from {:?} but embedding.model_identifier is '{}'; \
             re-ingest the corpus or change the configured model",
            models, model
        )));
    }

    if config.embedding.provider == EmbeddingProviderKind::Local {
        if let Some(dims) = vectors.dimensions()? {
            if dims != config.embedding.dimensions {
                return Err(RagError::InvalidConfig(format!(
                    "vector index has {} dimensions, embedding.dimensions is {}",
                    dims, config.embedding.dimensions
                )));
            }
        }
    }

    let vector_count = vectors.len()?;
    let keyword_count = keywords.len()?;
    let chunk_count = documents.count_chunks()?;
    if vector_count != keyword_count || vector_count != chunk_count {
        return Err(RagError::IndexCorrupt {
            path: config.storage.data_dir.clone(),
            reason: format!(
                "stores disagree: {} vectors, {} keyword entries, {} chunks",
                vector_count, keyword_count, chunk_count
            ),
        });
    }
    Ok(())
}
