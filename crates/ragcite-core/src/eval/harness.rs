//! Replays labelled queries through the hybrid retriever

use super::report::{EvalSettings, EvaluationRecord, MetricsReport};
use crate::error::{RagError, Result};
use crate::search::HybridRetriever;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;

/// One labelled query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub query_id: String,
    pub query: String,
    #[serde(alias = "relevant_doc_ids")]
    pub relevant_chunk_ids: Vec<String>,
}

/// Load a test set from a JSON array or a JSONL file
pub fn load_test_set(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::InvalidInput(format!("cannot read test set {}: {}", path.display(), e))
    })?;
    let cases = parse_test_set(&content)?;
    validate_test_set(&cases)?;
    tracing::info!(path = %path.display(), cases = cases.len(), "Loaded test set");
    Ok(cases)
}

pub fn parse_test_set(content: &str) -> Result<Vec<TestCase>> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content)
            .map_err(|e| RagError::InvalidInput(format!("invalid test set: {}", e)));
    }

    let mut cases = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let case = serde_json::from_str(line).map_err(|e| {
            RagError::InvalidInput(format!("invalid test case on line {}: {}", i + 1, e))
        })?;
        cases.push(case);
    }
    Ok(cases)
}

/// Reject sets that would produce meaningless metrics
pub fn validate_test_set(cases: &[TestCase]) -> Result<()> {
    if cases.is_empty() {
        return Err(RagError::InvalidInput("test set is empty".into()));
    }
    let mut seen = HashSet::new();
    for case in cases {
        if !seen.insert(case.query_id.as_str()) {
            return Err(RagError::InvalidInput(format!(
                "duplicate query id '{}'",
                case.query_id
            )));
        }
        if case.query.trim().is_empty() {
            return Err(RagError::InvalidInput(format!(
                "query '{}' has no text",
                case.query_id
            )));
        }
        if case.relevant_chunk_ids.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "query '{}' lists no relevant chunks",
                case.query_id
            )));
        }
    }
    Ok(())
}

/// Sorted, deduplicated k values. Zero is rejected.
pub fn normalize_k_values(k_values: &[usize]) -> Result<Vec<usize>> {
    if k_values.is_empty() {
        return Err(RagError::InvalidInput("at least one k value is required".into()));
    }
    if k_values.contains(&0) {
        return Err(RagError::InvalidInput("k values must be positive".into()));
    }
    let mut ks = k_values.to_vec();
    ks.sort_unstable();
    ks.dedup();
    Ok(ks)
}

/// `|relevant ∩ top_k| / |relevant|`
pub fn recall_at_k(relevant: &HashSet<&str>, retrieved: &[String], k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|id| relevant.contains(id.as_str()))
        .collect::<HashSet<_>>()
        .len();
    hits as f64 / relevant.len() as f64
}

/// `1 / rank` of the first relevant result, 0 when none was retrieved
pub fn reciprocal_rank(relevant: &HashSet<&str>, retrieved: &[String]) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// Run every case through `retriever` at depth `max(k_values)`.
///
/// The first failing query aborts the run with its id.
pub async fn evaluate(
    retriever: &HybridRetriever,
    cases: &[TestCase],
    mut settings: EvalSettings,
) -> Result<MetricsReport> {
    validate_test_set(cases)?;
    let k_values = normalize_k_values(&settings.k_values)?;
    let depth = k_values.iter().copied().max().unwrap_or(1);
    settings.k_values = k_values.clone();

    let mut records = Vec::with_capacity(cases.len());
    for case in cases {
        let start = Instant::now();
        let retrieved = retriever
            .retrieve(&case.query, depth)
            .await
            .map_err(|e| RagError::Evaluation {
                query_id: case.query_id.clone(),
                message: e.to_string(),
            })?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let retrieved_ids: Vec<String> = retrieved.into_iter().map(|c| c.chunk_id).collect();
        let relevant: HashSet<&str> = case.relevant_chunk_ids.iter().map(String::as_str).collect();
        let recall: BTreeMap<usize, f64> = k_values
            .iter()
            .map(|&k| (k, recall_at_k(&relevant, &retrieved_ids, k)))
            .collect();
        let rr = reciprocal_rank(&relevant, &retrieved_ids);

        tracing::debug!(
            query_id = %case.query_id,
            reciprocal_rank = rr,
            latency_ms,
            "Evaluated query"
        );
        records.push(EvaluationRecord {
            query_id: case.query_id.clone(),
            query_text: case.query.clone(),
            relevant_chunk_ids: case.relevant_chunk_ids.clone(),
            retrieved_chunk_ids: retrieved_ids,
            recall_at_k: recall,
            reciprocal_rank: rr,
            latency_ms,
        });
    }

    let report = MetricsReport::from_records(settings, records);
    tracing::info!(
        queries = report.query_count,
        mrr = report.mrr,
        p95_ms = report.latency_ms.p95,
        "Evaluation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recall_and_rr() {
        let relevant: HashSet<&str> = ["a", "b"].into_iter().collect();
        let retrieved = ids(&["x", "a", "y", "b"]);
        assert_eq!(recall_at_k(&relevant, &retrieved, 1), 0.0);
        assert_eq!(recall_at_k(&relevant, &retrieved, 2), 0.5);
        assert_eq!(recall_at_k(&relevant, &retrieved, 10), 1.0);
        assert_eq!(reciprocal_rank(&relevant, &retrieved), 0.5);
        assert_eq!(reciprocal_rank(&relevant, &ids(&["x"])), 0.0);
    }

    #[test]
    fn test_parse_jsonl_with_doc_alias() {
        let content = r#"
{"query_id": "q1", "query": "capital of France", "relevant_chunk_ids": ["a#0"]}

{"query_id": "q2", "query": "ownership", "relevant_doc_ids": ["b#1", "b#2"]}
"#;
        let cases = parse_test_set(content).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].relevant_chunk_ids, ids(&["b#1", "b#2"]));
    }

    #[test]
    fn test_parse_json_array() {
        let content = r#"[{"query_id": "q1", "query": "x", "relevant_chunk_ids": ["a"]}]"#;
        assert_eq!(parse_test_set(content).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let err = parse_test_set("{\"query_id\": \"q1\"}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_validation() {
        let case = |id: &str, rel: &[&str]| TestCase {
            query_id: id.to_string(),
            query: "q".to_string(),
            relevant_chunk_ids: ids(rel),
        };
        assert!(validate_test_set(&[]).is_err());
        assert!(validate_test_set(&[case("q1", &["a"]), case("q1", &["b"])]).is_err());
        assert!(validate_test_set(&[case("q1", &[])]).is_err());
        assert!(validate_test_set(&[case("q1", &["a"]), case("q2", &["b"])]).is_ok());
    }

    #[test]
    fn test_k_values_normalized() {
        assert_eq!(normalize_k_values(&[10, 1, 5, 1]).unwrap(), vec![1, 5, 10]);
        assert!(normalize_k_values(&[0, 3]).is_err());
        assert!(normalize_k_values(&[]).is_err());
    }
}
