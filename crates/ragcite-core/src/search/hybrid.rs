//! Hybrid retrieval with min-max normalized weighted score fusion

use super::RetrievedCandidate;
use crate::config::{validate_weights, RetrievalConfig};
use crate::error::{RagError, Result};
use crate::index::chunker::CharSpan;
use crate::index::{KeywordIndex, VectorIndex};
use crate::llm::Embedder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Weights applied to the normalized vector and keyword scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector: f64,
    pub keyword: f64,
}

impl FusionWeights {
    /// Fails with `InvalidWeights` unless both are in [0, 1] and sum to 1.0
    pub fn new(vector: f64, keyword: f64) -> Result<Self> {
        validate_weights(vector, keyword)?;
        Ok(Self { vector, keyword })
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            keyword: 0.3,
        }
    }
}

/// Scores for one chunk after fusion
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub chunk_id: String,
    /// Normalized vector score, 0 when absent from the vector results
    pub vector_score: f64,
    /// Normalized keyword score, 0 when absent from the keyword results
    pub keyword_score: f64,
    pub fused_score: f64,
    pub raw_vector_score: Option<f32>,
    pub raw_keyword_score: Option<f32>,
    pub rank: usize,
}

impl FusedScore {
    fn absent(chunk_id: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            vector_score: 0.0,
            keyword_score: 0.0,
            fused_score: 0.0,
            raw_vector_score: None,
            raw_keyword_score: None,
            rank: 0,
        }
    }
}

/// Min-max normalize scores to [0, 1].
///
/// A single result, or a set where every score is equal, normalizes to 1.0.
pub fn normalize_scores(results: &[(String, f32)]) -> Vec<(String, f64)> {
    if results.is_empty() {
        return Vec::new();
    }

    let s_min = results
        .iter()
        .map(|(_, s)| *s as f64)
        .fold(f64::INFINITY, f64::min);
    let s_max = results
        .iter()
        .map(|(_, s)| *s as f64)
        .fold(f64::NEG_INFINITY, f64::max);

    results
        .iter()
        .map(|(id, s)| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (*s as f64 - s_min) / (s_max - s_min)
            };
            (id.clone(), norm)
        })
        .collect()
}

/// Fuse two ranked lists into one ordering.
///
/// Sorted by fused score descending, then normalized vector score descending,
/// then chunk id ascending. Ranks are 1-based.
pub fn fuse(
    vector_results: &[(String, f32)],
    keyword_results: &[(String, f32)],
    weights: FusionWeights,
) -> Vec<FusedScore> {
    let mut fused: HashMap<String, FusedScore> = HashMap::new();

    for ((id, norm), (_, raw)) in normalize_scores(vector_results)
        .into_iter()
        .zip(vector_results)
    {
        let entry = fused.entry(id).or_insert_with_key(|id| FusedScore::absent(id));
        entry.vector_score = norm;
        entry.raw_vector_score = Some(*raw);
    }
    for ((id, norm), (_, raw)) in normalize_scores(keyword_results)
        .into_iter()
        .zip(keyword_results)
    {
        let entry = fused.entry(id).or_insert_with_key(|id| FusedScore::absent(id));
        entry.keyword_score = norm;
        entry.raw_keyword_score = Some(*raw);
    }

    let mut ranked: Vec<FusedScore> = fused
        .into_values()
        .map(|mut f| {
            f.fused_score = weights.vector * f.vector_score + weights.keyword * f.keyword_score;
            f
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| b.vector_score.total_cmp(&a.vector_score))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    for (i, f) in ranked.iter_mut().enumerate() {
        f.rank = i + 1;
    }
    ranked
}

/// Queries both indexes and fuses their rankings
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<VectorIndex>,
    keywords: Arc<KeywordIndex>,
    weights: FusionWeights,
    candidate_k: usize,
    index_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<VectorIndex>,
        keywords: Arc<KeywordIndex>,
        weights: FusionWeights,
    ) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            embedder,
            vectors,
            keywords,
            weights,
            candidate_k: defaults.candidate_k,
            index_timeout: defaults.index_timeout(),
        }
    }

    pub fn from_config(
        config: &RetrievalConfig,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<VectorIndex>,
        keywords: Arc<KeywordIndex>,
    ) -> Result<Self> {
        let weights = FusionWeights::new(config.vector_weight, config.keyword_weight)?;
        Ok(Self::new(embedder, vectors, keywords, weights)
            .with_candidate_k(config.candidate_k)
            .with_index_timeout(config.index_timeout()))
    }

    pub fn with_candidate_k(mut self, candidate_k: usize) -> Self {
        self.candidate_k = candidate_k;
        self
    }

    pub fn with_index_timeout(mut self, timeout: Duration) -> Self {
        self.index_timeout = timeout;
        self
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    /// Per-index depth for a final result size of `k`
    pub fn depth_for(&self, k: usize) -> usize {
        k.max(self.candidate_k)
    }

    /// Embed the query text; `None` when the vector ranker has zero weight
    pub async fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>> {
        if self.weights.vector == 0.0 {
            return Ok(None);
        }
        let embedding = self.embedder.embed(query).await?;
        Ok(Some(embedding))
    }

    /// Retrieve the top `k` candidates for `query`
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedCandidate>> {
        let embedding = self.embed_query(query).await?;
        self.retrieve_with_embedding(query, embedding.as_deref(), k)
            .await
    }

    /// Retrieve using an already-computed query embedding
    pub async fn retrieve_with_embedding(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        k: usize,
    ) -> Result<Vec<RetrievedCandidate>> {
        self.retrieve_weighted(query, embedding, k, self.weights)
            .await
    }

    /// Rank by keyword score alone, for when the query cannot be embedded.
    ///
    /// The keyword index is queried even if its configured weight is zero.
    pub async fn retrieve_keyword_only(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedCandidate>> {
        let weights = FusionWeights {
            vector: 0.0,
            keyword: 1.0,
        };
        self.retrieve_weighted(query, None, k, weights).await
    }

    async fn retrieve_weighted(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        k: usize,
        weights: FusionWeights,
    ) -> Result<Vec<RetrievedCandidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let depth = self.depth_for(k);
        let start = Instant::now();

        let vector_fut = self.query_vectors(embedding.map(|e| e.to_vec()), depth);
        let keyword_fut = self.query_keywords(query, depth, weights.keyword);
        let (vector_results, keyword_results) =
            futures::future::try_join(vector_fut, keyword_fut).await?;

        let fused = fuse(&vector_results, &keyword_results, weights);
        let mut candidates = Vec::with_capacity(k);
        for score in fused {
            if candidates.len() == k {
                break;
            }
            match self.resolve(&score.chunk_id)? {
                Some((document_id, source_path, text, char_span)) => {
                    candidates.push(RetrievedCandidate {
                        chunk_id: score.chunk_id,
                        vector_score: score.vector_score,
                        keyword_score: score.keyword_score,
                        fused_score: score.fused_score,
                        rank: candidates.len() + 1,
                        document_id,
                        source_path,
                        text,
                        char_span,
                    });
                }
                None => {
                    tracing::debug!(chunk_id = %score.chunk_id, "Chunk vanished during retrieval");
                }
            }
        }

        tracing::debug!(
            vector_hits = vector_results.len(),
            keyword_hits = keyword_results.len(),
            returned = candidates.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Hybrid retrieval finished"
        );
        Ok(candidates)
    }

    async fn query_vectors(
        &self,
        embedding: Option<Vec<f32>>,
        depth: usize,
    ) -> Result<Vec<(String, f32)>> {
        let Some(embedding) = embedding else {
            return Ok(Vec::new());
        };
        let index = Arc::clone(&self.vectors);
        run_index_query(self.index_timeout, "vector", move || {
            index.query(&embedding, depth)
        })
        .await
    }

    async fn query_keywords(
        &self,
        query: &str,
        depth: usize,
        weight: f64,
    ) -> Result<Vec<(String, f32)>> {
        if weight == 0.0 {
            return Ok(Vec::new());
        }
        let index = Arc::clone(&self.keywords);
        let query = query.to_string();
        run_index_query(self.index_timeout, "keyword", move || {
            index.query(&query, depth)
        })
        .await
    }

    /// Chunk metadata from the vector index, falling back to the keyword index
    fn resolve(&self, chunk_id: &str) -> Result<Option<(String, String, String, CharSpan)>> {
        if let Some(meta) = self.vectors.get(chunk_id)? {
            return Ok(Some((
                meta.document_id,
                meta.source_path,
                meta.text,
                meta.char_span,
            )));
        }
        Ok(self.keywords.get(chunk_id)?.map(|(document_id, text)| {
            let span = CharSpan {
                start: 0,
                end: text.chars().count(),
            };
            (document_id.clone(), document_id, text, span)
        }))
    }
}

/// Run a blocking index query off the async executor with a timeout
async fn run_index_query<F>(
    timeout: Duration,
    name: &'static str,
    f: F,
) -> Result<Vec<(String, f32)>>
where
    F: FnOnce() -> Result<Vec<(String, f32)>> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(RagError::Search(format!(
            "{} index query failed: {}",
            name, join_err
        ))),
        Err(_) => Err(RagError::Search(format!(
            "{} index query timed out after {}ms",
            name,
            timeout.as_millis()
        ))),
    }
}
