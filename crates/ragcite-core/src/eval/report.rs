//! Evaluation artifacts

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const REPORT_VERSION: u32 = 1;

/// Retrieval settings a report was produced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSettings {
    pub embedding_model: String,
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub candidate_k: usize,
    pub k_values: Vec<usize>,
}

/// Per-query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub query_id: String,
    pub query_text: String,
    pub relevant_chunk_ids: Vec<String>,
    pub retrieved_chunk_ids: Vec<String>,
    pub recall_at_k: BTreeMap<usize, f64>,
    pub reciprocal_rank: f64,
    pub latency_ms: f64,
}

/// Nearest-rank latency percentiles in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub mean: f64,
    pub max: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Nearest-rank percentile of an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregate result of one evaluation run. Field order is stable so two
/// reports diff cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub settings: EvalSettings,
    pub query_count: usize,
    pub mean_recall_at_k: BTreeMap<usize, f64>,
    pub mrr: f64,
    pub latency_ms: LatencySummary,
    pub records: Vec<EvaluationRecord>,
}

impl MetricsReport {
    pub fn from_records(settings: EvalSettings, records: Vec<EvaluationRecord>) -> Self {
        let n = records.len();
        let mut mean_recall_at_k = BTreeMap::new();
        for &k in &settings.k_values {
            let sum: f64 = records
                .iter()
                .map(|r| r.recall_at_k.get(&k).copied().unwrap_or(0.0))
                .sum();
            mean_recall_at_k.insert(k, if n > 0 { sum / n as f64 } else { 0.0 });
        }
        let mrr = if n > 0 {
            records.iter().map(|r| r.reciprocal_rank).sum::<f64>() / n as f64
        } else {
            0.0
        };
        let latencies: Vec<f64> = records.iter().map(|r| r.latency_ms).collect();

        Self {
            version: REPORT_VERSION,
            generated_at: Utc::now(),
            settings,
            query_count: n,
            mean_recall_at_k,
            mrr,
            latency_ms: LatencySummary::from_samples(&latencies),
            records,
        }
    }

    pub fn record(&self, query_id: &str) -> Option<&EvaluationRecord> {
        self.records.iter().find(|r| r.query_id == query_id)
    }
}

pub fn save_report(path: &Path, report: &MetricsReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_report(path: &Path) -> Result<MetricsReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
