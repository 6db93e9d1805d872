//! Retrieval
//!
//! Provides hybrid search over the vector and keyword indexes with
//! min-max normalized weighted fusion.

mod hybrid;

pub use hybrid::*;

use crate::index::chunker::CharSpan;
use serde::{Deserialize, Serialize};

/// One ranked chunk produced for a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCandidate {
    pub chunk_id: String,
    /// Normalized vector score in [0, 1]
    pub vector_score: f64,
    /// Normalized keyword score in [0, 1]
    pub keyword_score: f64,
    pub fused_score: f64,
    /// 1-based
    pub rank: usize,

    // Chunk-level fields carried to the synthesizer
    pub document_id: String,
    pub source_path: String,
    pub text: String,
    pub char_span: CharSpan,
}
