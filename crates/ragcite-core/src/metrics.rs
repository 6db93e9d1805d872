//! Per-stage pipeline counters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Pipeline stage measured by [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Retrieval,
    Synthesis,
    Query,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Embedding,
        Stage::Retrieval,
        Stage::Synthesis,
        Stage::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Retrieval => "retrieval",
            Self::Synthesis => "synthesis",
            Self::Query => "query",
        }
    }
}

#[derive(Debug, Default)]
struct StageCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Request, error and latency counters for each stage
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    embedding: StageCounters,
    retrieval: StageCounters,
    synthesis: StageCounters,
    query: StageCounters,
    grounding_violations: AtomicU64,
    degraded_answers: AtomicU64,
    keyword_fallbacks: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, stage: Stage) -> &StageCounters {
        match stage {
            Stage::Embedding => &self.embedding,
            Stage::Retrieval => &self.retrieval,
            Stage::Synthesis => &self.synthesis,
            Stage::Query => &self.query,
        }
    }

    pub fn record(&self, stage: Stage, elapsed: Duration, ok: bool) {
        let c = self.counters(stage);
        c.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
        c.total_latency_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_grounding_violations(&self, count: usize) {
        if count > 0 {
            self.grounding_violations
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_degraded(&self) {
        self.degraded_answers.fetch_add(1, Ordering::Relaxed);
    }

    /// A query was ranked without its embedding
    pub fn record_keyword_fallback(&self) {
        self.keyword_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stages = Stage::ALL
            .iter()
            .map(|&stage| {
                let c = self.counters(stage);
                let requests = c.requests.load(Ordering::Relaxed);
                let total = c.total_latency_ms.load(Ordering::Relaxed);
                (
                    stage.as_str().to_string(),
                    StageSnapshot {
                        requests,
                        errors: c.errors.load(Ordering::Relaxed),
                        avg_latency_ms: if requests > 0 {
                            total as f64 / requests as f64
                        } else {
                            0.0
                        },
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            stages,
            grounding_violations: self.grounding_violations.load(Ordering::Relaxed),
            degraded_answers: self.degraded_answers.load(Ordering::Relaxed),
            keyword_fallbacks: self.keyword_fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
}

/// Point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageSnapshot>,
    pub grounding_violations: u64,
    pub degraded_answers: u64,
    #[serde(default)]
    pub keyword_fallbacks: u64,
}
