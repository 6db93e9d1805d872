//! HTTP client for OpenAI-compatible chat completion services (vLLM, OpenAI, Ollama)

use super::{ChatMessage, LLMProvider};
use crate::config::LLMServiceConfig;
use crate::error::{ProviderError, ProviderErrorKind, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Build a reqwest client with the given per-request timeout
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::from(e).into())
}

/// Send a request and turn non-2xx responses into classified provider errors
pub(crate) async fn send_json(
    req: reqwest::RequestBuilder,
    api_key: Option<&str>,
    service: &str,
) -> std::result::Result<reqwest::Response, ProviderError> {
    let req = match api_key {
        Some(key) => req.header("Authorization", format!("Bearer {}", key)),
        None => req,
    };

    let response = req.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::new(
        ProviderErrorKind::from_status(status.as_u16()),
        format!("{} returned HTTP {}: {}", service, status, body),
    ))
}

/// Chat completion client for vLLM/OpenAI-compatible servers
pub struct HttpLLMClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
}

impl HttpLLMClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = http_client(config.timeout())?;
        Ok(Self {
            http_client,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LLMServiceConfig::default())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl LLMProvider for HttpLLMClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.config.url.trim_end_matches('/')
        );
        let response = send_json(
            self.http_client.post(&url).json(&request),
            self.config.api_key.as_deref(),
            "LLM service",
        )
        .await?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("chat response: {}", e)))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::invalid_response("no choices in chat response"))?;

        tracing::debug!(
            model = %self.config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
