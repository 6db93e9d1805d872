//! Provider integration
//!
//! Provides traits and implementations for:
//! - Embedding generation, remote (`HttpEmbedder`) or local (`HashingEmbedder`)
//! - An LRU + TTL embedding cache
//! - Chat completion against OpenAI-compatible services
//! - Retry with exponential backoff, including a retrying embedder decorator

mod cache;
mod client;
mod http_embedder;
mod local_embedder;
mod retry;
mod traits;

pub use cache::{CacheStats, CachedEmbedder, EmbeddingCache};
pub use client::HttpLLMClient;
pub use http_embedder::HttpEmbedder;
pub use local_embedder::HashingEmbedder;
pub use retry::{
    RetryEvent, RetryOutcome, RetryPolicy, RetryStats, RetryStatsSnapshot, RetryingEmbedder,
};
pub use traits::*;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind, LLMServiceConfig};
use crate::error::Result;
use std::sync::Arc;

/// Construct the embedding provider selected by configuration
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProviderKind::Local => Arc::new(HashingEmbedder::new(
            config.dimensions,
            config.model_identifier.clone(),
        )),
        EmbeddingProviderKind::Http => Arc::new(HttpEmbedder::from_config(config)?),
    };
    tracing::debug!(
        provider = ?config.provider,
        model = %config.model_identifier,
        "Built embedding provider"
    );
    Ok(embedder)
}

/// Construct the chat completion provider
pub fn build_llm(config: &LLMServiceConfig) -> Result<Arc<dyn LLMProvider>> {
    Ok(Arc::new(HttpLLMClient::new(config.clone())?))
}
