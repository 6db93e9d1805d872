//! Grounded answer synthesis with retry and degraded fallback

use super::citations::ground_citations;
use super::degraded::render_degraded;
use super::state::{QueryState, QueryStateMachine};
use super::{source_marker, Answer, AnswerMode, Citation};
use crate::config::{Config, SynthesisConfig};
use crate::db::SessionTurn;
use crate::error::{ProviderError, RagError, Result};
use crate::llm::{ChatMessage, LLMProvider, RetryEvent, RetryOutcome, RetryPolicy, RetryStats};
use crate::metrics::{PipelineMetrics, Stage};
use crate::search::RetrievedCandidate;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

/// Reply used when there is nothing to answer from
pub const INSUFFICIENT_INFORMATION: &str =
    "There is not enough information in the provided documents to answer this question.";

fn system_prompt() -> String {
    format!(
        "You answer questions using only the numbered sources supplied with the question.\n\
         \n\
         Rules:\n\
         1. Use only information found in the sources. Do not add outside knowledge.\n\
         2. After every factual statement, cite the source it came from with its marker, \
         for example [S1] or [S2][S3].\n\
         3. Cite only markers that appear in the source list.\n\
         4. If the sources do not contain the answer, reply exactly: \"{}\"\n\
         5. Do not refer to sources in prose (\"according to source 1\"); use the markers.\n\
         6. A previous conversation, when present, only clarifies the question. \
         Never cite it and never treat it as a source.",
        INSUFFICIENT_INFORMATION
    )
}

/// How a synthesis attempt ended
#[derive(Debug)]
pub enum SynthesisOutcome {
    Answered(Answer),
    /// Every LLM attempt failed transiently; the answer holds raw passages
    Degraded {
        answer: Answer,
        attempts: u32,
        last_error: ProviderError,
    },
    /// A permanent provider error
    Failed(RagError),
}

impl SynthesisOutcome {
    /// Degraded answers are still answers; only permanent failures are errors
    pub fn into_result(self) -> Result<Answer> {
        match self {
            Self::Answered(answer) | Self::Degraded { answer, .. } => Ok(answer),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Builds the prompt, calls the LLM and validates its citations
pub struct Synthesizer {
    llm: Arc<dyn LLMProvider>,
    retry: RetryPolicy,
    context_budget_chars: usize,
    excerpt_chars: usize,
    metrics: Arc<PipelineMetrics>,
    retry_stats: Arc<RetryStats>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LLMProvider>, retry: RetryPolicy) -> Self {
        let defaults = SynthesisConfig::default();
        Self {
            llm,
            retry,
            context_budget_chars: defaults.context_budget_chars,
            excerpt_chars: defaults.degraded_excerpt_chars,
            metrics: Arc::new(PipelineMetrics::new()),
            retry_stats: Arc::new(RetryStats::default()),
        }
    }

    pub fn from_config(config: &Config, llm: Arc<dyn LLMProvider>) -> Self {
        let retry = RetryPolicy::from_config(&config.retry).with_attempt_timeout(config.llm.timeout());
        Self::new(llm, retry)
            .with_context_budget(config.synthesis.context_budget_chars)
            .with_excerpt_chars(config.synthesis.degraded_excerpt_chars)
    }

    pub fn with_context_budget(mut self, chars: usize) -> Self {
        self.context_budget_chars = chars;
        self
    }

    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_retry_stats(mut self, stats: Arc<RetryStats>) -> Self {
        self.retry_stats = stats;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn retry_stats(&self) -> &Arc<RetryStats> {
        &self.retry_stats
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Leading candidates that fit the context budget. The first is always kept.
    pub fn select_sources<'a>(&self, candidates: &'a [RetrievedCandidate]) -> &'a [RetrievedCandidate] {
        let mut used = 0usize;
        let mut count = 0usize;
        for candidate in candidates {
            let len = candidate.text.chars().count();
            if count > 0 && used + len > self.context_budget_chars {
                break;
            }
            used += len;
            count += 1;
        }
        &candidates[..count]
    }

    pub fn build_messages(&self, query: &str, sources: &[RetrievedCandidate]) -> Vec<ChatMessage> {
        self.build_messages_with_history(query, &[], sources)
    }

    /// Prompt with earlier session turns placed ahead of the sources.
    ///
    /// Markers in earlier answers are stripped so they cannot be mistaken for
    /// the current source list.
    pub fn build_messages_with_history(
        &self,
        query: &str,
        history: &[SessionTurn],
        sources: &[RetrievedCandidate],
    ) -> Vec<ChatMessage> {
        let mut conversation = String::new();
        if !history.is_empty() {
            conversation.push_str("Previous conversation (context only, not a source):\n");
            for turn in history {
                let answer = ground_citations(&turn.answer, 0).text;
                let answer: String = answer.trim().chars().take(self.excerpt_chars).collect();
                let _ = write!(
                    conversation,
                    "User: {}\nAssistant: {}\n",
                    turn.question.trim(),
                    answer
                );
            }
            conversation.push('\n');
        }

        let mut context = String::new();
        for (i, source) in sources.iter().enumerate() {
            let _ = write!(
                context,
                "[{}] {}\n{}\n\n",
                source_marker(i + 1),
                source.source_path,
                source.text.trim()
            );
        }

        let user = format!(
            "{}Sources:\n\n{}Question: {}\n\n\
             Answer using only the sources above and cite each fact with its marker.",
            conversation,
            context,
            query.trim()
        );
        vec![ChatMessage::system(system_prompt()), ChatMessage::user(user)]
    }

    /// Synthesize outside of a tracked query
    pub async fn synthesize(&self, query: &str, candidates: &[RetrievedCandidate]) -> Result<Answer> {
        let mut state = QueryStateMachine::new(self.retry.max_attempts);
        state.transition(QueryState::Embedding)?;
        state.transition(QueryState::Retrieving)?;
        self.run(query, candidates, &mut state).await.into_result()
    }

    /// Drive `state` from `RETRIEVING` through synthesis to a terminal state
    pub async fn run(
        &self,
        query: &str,
        candidates: &[RetrievedCandidate],
        state: &mut QueryStateMachine,
    ) -> SynthesisOutcome {
        self.run_with_history(query, &[], candidates, state).await
    }

    /// [`Synthesizer::run`] for a question that continues a session
    pub async fn run_with_history(
        &self,
        query: &str,
        history: &[SessionTurn],
        candidates: &[RetrievedCandidate],
        state: &mut QueryStateMachine,
    ) -> SynthesisOutcome {
        let start = Instant::now();
        if let Err(e) = state.transition(QueryState::Synthesizing) {
            return SynthesisOutcome::Failed(e);
        }

        if candidates.is_empty() {
            tracing::info!("No candidates retrieved, skipping LLM call");
            if let Err(e) = state.transition(QueryState::Answered) {
                return SynthesisOutcome::Failed(e);
            }
            return SynthesisOutcome::Answered(Answer {
                text: INSUFFICIENT_INFORMATION.to_string(),
                citations: Vec::new(),
                mode: AnswerMode::Synthesized,
                latency_ms: start.elapsed().as_millis() as u64,
            });
        }

        let sources = self.select_sources(candidates);
        if sources.len() < candidates.len() {
            tracing::debug!(
                sent = sources.len(),
                dropped = candidates.len() - sources.len(),
                budget = self.context_budget_chars,
                "Context budget reached"
            );
        }
        let messages = self.build_messages_with_history(query, history, sources);

        let llm = &self.llm;
        let messages = &messages;
        let outcome = self
            .retry
            .run_observed(
                |attempt| async move {
                    tracing::debug!(attempt, model = llm.model_name(), "Calling LLM");
                    let text = llm.generate(messages).await?;
                    if text.trim().is_empty() {
                        return Err(ProviderError::invalid_response("empty completion").into());
                    }
                    Ok(text)
                },
                |event: &RetryEvent<'_>| {
                    if event.delay.is_some() {
                        if let Err(e) = state.transition(QueryState::Synthesizing) {
                            tracing::warn!(error = %e, "Retry beyond synthesis limit");
                        }
                    }
                },
            )
            .await;
        self.retry_stats.record(&outcome);

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                let grounded = ground_citations(&value, sources.len());
                if !grounded.violations.is_empty() {
                    tracing::warn!(
                        violations = ?grounded.violations,
                        sources = sources.len(),
                        "Stripped citations to sources that were not provided"
                    );
                    self.metrics
                        .record_grounding_violations(grounded.violations.len());
                }
                let citations = grounded
                    .cited
                    .iter()
                    .map(|&n| citation_for(n, &sources[n - 1]))
                    .collect();

                self.metrics.record(Stage::Synthesis, start.elapsed(), true);
                if let Err(e) = state.transition(QueryState::Answered) {
                    return SynthesisOutcome::Failed(e);
                }
                tracing::info!(attempts, sources = sources.len(), "Synthesized answer");
                SynthesisOutcome::Answered(Answer {
                    text: grounded.text.trim().to_string(),
                    citations,
                    mode: AnswerMode::Synthesized,
                    latency_ms: start.elapsed().as_millis() as u64,
                })
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    attempts,
                    error = %last_error,
                    "LLM unavailable, answering in degraded mode"
                );
                let (text, citations) = render_degraded(query, sources, self.excerpt_chars);
                self.metrics.record(Stage::Synthesis, start.elapsed(), false);
                self.metrics.record_degraded();
                if let Err(e) = state.transition(QueryState::Degraded) {
                    return SynthesisOutcome::Failed(e);
                }
                SynthesisOutcome::Degraded {
                    answer: Answer {
                        text,
                        citations,
                        mode: AnswerMode::Degraded,
                        latency_ms: start.elapsed().as_millis() as u64,
                    },
                    attempts,
                    last_error,
                }
            }
            RetryOutcome::Aborted { attempts, error } => {
                tracing::error!(attempts, error = %error, "Synthesis failed");
                self.metrics.record(Stage::Synthesis, start.elapsed(), false);
                state.fail();
                SynthesisOutcome::Failed(error)
            }
        }
    }
}

fn citation_for(n: usize, source: &RetrievedCandidate) -> Citation {
    Citation {
        marker: source_marker(n),
        chunk_id: source.chunk_id.clone(),
        source_path: source.source_path.clone(),
        char_span: source.char_span,
    }
}
