//! Retry with exponential backoff for provider calls

use super::Embedder;
use crate::config::RetryConfig;
use crate::error::{ProviderError, RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How many times to try a call and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Upper bound on a single attempt; elapsed attempts count as transient timeouts
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            attempt_timeout: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs_f64(config.backoff_base_seconds.max(0.0)),
        )
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_observed(op, |_| {}).await
    }

    /// Like [`run`](Self::run), reporting every failed attempt to `observer`
    /// before the backoff sleep. No lock is held while sleeping.
    pub async fn run_observed<T, F, Fut, O>(&self, mut op: F, mut observer: O) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        O: FnMut(&RetryEvent<'_>),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(r) => r,
                    Err(_) => Err(ProviderError::timeout(format!(
                        "attempt exceeded {}ms",
                        limit.as_millis()
                    ))
                    .into()),
                },
                None => op(attempt).await,
            };

            let error = match result {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    }
                }
                Err(RagError::Provider(e)) if e.is_transient() => e,
                Err(error) => {
                    tracing::warn!(attempt, error = %error, "Non-retryable failure");
                    return RetryOutcome::Aborted {
                        attempts: attempt,
                        error,
                    };
                }
            };

            if attempt >= self.max_attempts {
                observer(&RetryEvent {
                    attempt,
                    error: &error,
                    delay: None,
                });
                tracing::warn!(attempts = attempt, error = %error, "All retry attempts failed");
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                };
            }

            let delay = self.delay_for(attempt);
            observer(&RetryEvent {
                attempt,
                error: &error,
                delay: Some(delay),
            });
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// A failed attempt; `delay` is `None` when no retry follows
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub attempt: u32,
    pub error: &'a ProviderError,
    pub delay: Option<Duration>,
}

/// Result of a retried call
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed transiently
    Exhausted { attempts: u32, last_error: ProviderError },
    /// A non-retryable error stopped the loop
    Aborted { attempts: u32, error: RagError },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    /// Collapse into a `Result`, mapping exhaustion to `AllRetriesFailed`
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Exhausted {
                attempts,
                last_error,
            } => Err(RagError::AllRetriesFailed {
                attempts,
                last: last_error,
            }),
            Self::Aborted { error, .. } => Err(error),
        }
    }
}

/// Running totals over retried calls
#[derive(Debug, Default)]
pub struct RetryStats {
    total_calls: AtomicU64,
    first_try_successes: AtomicU64,
    retried_successes: AtomicU64,
    exhausted: AtomicU64,
    aborted: AtomicU64,
    total_retries: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryStatsSnapshot {
    pub total_calls: u64,
    pub first_try_successes: u64,
    pub retried_successes: u64,
    pub exhausted: u64,
    pub aborted: u64,
    pub total_retries: u64,
}

impl RetryStats {
    pub fn record<T>(&self, outcome: &RetryOutcome<T>) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let retries = outcome.attempts().saturating_sub(1) as u64;
        self.total_retries.fetch_add(retries, Ordering::Relaxed);
        let counter = match outcome {
            RetryOutcome::Succeeded { attempts: 1, .. } => &self.first_try_successes,
            RetryOutcome::Succeeded { .. } => &self.retried_successes,
            RetryOutcome::Exhausted { .. } => &self.exhausted,
            RetryOutcome::Aborted { .. } => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            first_try_successes: self.first_try_successes.load(Ordering::Relaxed),
            retried_successes: self.retried_successes.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
        }
    }
}

/// Embedder decorator that retries transient provider failures.
///
/// Exhausted retries surface as `AllRetriesFailed`; permanent errors pass
/// through after the first attempt.
pub struct RetryingEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
    stats: Arc<RetryStats>,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            stats: Arc::new(RetryStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<RetryStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<RetryStats> {
        &self.stats
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inner = &self.inner;
        let outcome = self.policy.run(move |_| inner.embed_batch(texts)).await;
        self.stats.record(&outcome);
        outcome.into_result()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
