//! HTTP-based embedder using an OpenAI-compatible `/v1/embeddings` endpoint

use super::client::{http_client, send_json};
use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedder that uses an external HTTP service (vLLM, OpenAI, etc.)
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

impl HttpEmbedder {
    /// Create from configuration
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client(std::time::Duration::from_secs(config.timeout_secs))?,
            url: format!("{}/v1/embeddings", config.url.trim_end_matches('/')),
            model: config.model_identifier.clone(),
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order response rows by their `index` field and check the count matches
fn order_embeddings(
    mut data: Vec<EmbedData>,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    if data.len() != expected {
        return Err(ProviderError::invalid_response(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = send_json(
            self.http_client.post(&self.url).json(&request),
            self.api_key.as_deref(),
            "Embedding service",
        )
        .await?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("embedding response: {}", e)))?;

        tracing::debug!(count = texts.len(), model = %self.model, "Embedded batch");
        Ok(order_embeddings(parsed.data, texts.len())?)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: Option<usize>, v: f32) -> EmbedData {
        EmbedData {
            index,
            embedding: vec![v],
        }
    }

    #[test]
    fn test_order_by_index() {
        let out = order_embeddings(vec![row(Some(1), 1.0), row(Some(0), 0.0)], 2).unwrap();
        assert_eq!(out, vec![vec![0.0], vec![1.0]]);
    }

    #[test]
    fn test_count_mismatch_is_invalid_response() {
        let err = order_embeddings(vec![row(None, 1.0)], 2).unwrap_err();
        assert_eq!(err.kind, crate::error::ProviderErrorKind::InvalidResponse);
    }
}
