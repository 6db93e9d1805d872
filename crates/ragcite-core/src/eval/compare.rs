//! Baseline comparison

use super::report::MetricsReport;
use crate::config::EvalConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerances for [`compare`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Allowed absolute drop in recall, MRR or per-query reciprocal rank
    pub recall_tolerance: f64,
    /// Allowed relative p95 latency growth
    pub latency_regression_ratio: f64,
    /// p95 growth in milliseconds below which latency is never flagged
    #[serde(default)]
    pub latency_regression_min_ms: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self::from(&EvalConfig::default())
    }
}

impl From<&EvalConfig> for CompareOptions {
    fn from(config: &EvalConfig) -> Self {
        Self {
            recall_tolerance: config.recall_tolerance,
            latency_regression_ratio: config.latency_regression_ratio,
            latency_regression_min_ms: config.latency_regression_min_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionKind {
    RecallDrop,
    MrrDrop,
    MissingK,
    QueryRankDrop,
    MissingQuery,
    LatencyIncrease,
}

/// A metric that got worse between two reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub kind: RegressionKind,
    pub metric: String,
    pub baseline: Option<f64>,
    pub current: Option<f64>,
}

impl fmt::Display for Regression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.baseline, self.current) {
            (Some(b), Some(c)) => write!(f, "{}: {:.4} -> {:.4}", self.metric, b, c),
            (Some(b), None) => write!(f, "{}: {:.4} -> missing", self.metric, b),
            _ => write!(f, "{}", self.metric),
        }
    }
}

const EPSILON: f64 = 1e-9;

/// Field-by-field comparison of `current` against `baseline`.
///
/// `generated_at` and settings are not compared.
pub fn compare(
    baseline: &MetricsReport,
    current: &MetricsReport,
    options: CompareOptions,
) -> Vec<Regression> {
    let tolerance = options.recall_tolerance.max(0.0) + EPSILON;
    let mut regressions = Vec::new();

    for (&k, &before) in &baseline.mean_recall_at_k {
        let metric = format!("recall@{}", k);
        match current.mean_recall_at_k.get(&k) {
            None => regressions.push(Regression {
                kind: RegressionKind::MissingK,
                metric,
                baseline: Some(before),
                current: None,
            }),
            Some(&after) if after < before - tolerance => regressions.push(Regression {
                kind: RegressionKind::RecallDrop,
                metric,
                baseline: Some(before),
                current: Some(after),
            }),
            Some(_) => {}
        }
    }

    if current.mrr < baseline.mrr - tolerance {
        regressions.push(Regression {
            kind: RegressionKind::MrrDrop,
            metric: "mrr".to_string(),
            baseline: Some(baseline.mrr),
            current: Some(current.mrr),
        });
    }

    for before in &baseline.records {
        let metric = format!("reciprocal_rank[{}]", before.query_id);
        match current.record(&before.query_id) {
            None => regressions.push(Regression {
                kind: RegressionKind::MissingQuery,
                metric,
                baseline: Some(before.reciprocal_rank),
                current: None,
            }),
            Some(after) if after.reciprocal_rank < before.reciprocal_rank - tolerance => {
                regressions.push(Regression {
                    kind: RegressionKind::QueryRankDrop,
                    metric,
                    baseline: Some(before.reciprocal_rank),
                    current: Some(after.reciprocal_rank),
                })
            }
            Some(_) => {}
        }
    }

    let p95_before = baseline.latency_ms.p95;
    let p95_after = current.latency_ms.p95;
    let ratio_exceeded =
        p95_before > 0.0 && p95_after > p95_before * (1.0 + options.latency_regression_ratio.max(0.0));
    let floor_exceeded = p95_after - p95_before > options.latency_regression_min_ms.max(0.0);
    if ratio_exceeded && floor_exceeded {
        regressions.push(Regression {
            kind: RegressionKind::LatencyIncrease,
            metric: "latency_ms.p95".to_string(),
            baseline: Some(p95_before),
            current: Some(p95_after),
        });
    }

    if !regressions.is_empty() {
        tracing::warn!(count = regressions.len(), "Evaluation regressions detected");
    }
    regressions
}
