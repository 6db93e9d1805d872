//! JSON output formatter

use super::Skipped;
use ragcite_core::{Answer, IngestReport, Regression, RetrievedCandidate};
use serde::Serialize;

pub fn to_pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string()) + "\n"
}

pub fn format_answer(answer: &Answer) -> String {
    to_pretty(answer)
}

pub fn format_ingest(reports: &[IngestReport], skipped: &[Skipped]) -> String {
    let skipped: Vec<serde_json::Value> = skipped
        .iter()
        .map(|s| serde_json::json!({ "path": s.path, "reason": s.reason }))
        .collect();
    to_pretty(&serde_json::json!({
        "ingested": reports,
        "skipped": skipped,
    }))
}

pub fn format_candidates(candidates: &[RetrievedCandidate]) -> String {
    let output: Vec<serde_json::Value> = candidates
        .iter()
        .map(|c| {
            serde_json::json!({
                "rank": c.rank,
                "chunk_id": c.chunk_id,
                "source": c.source_path,
                "fused_score": c.fused_score,
                "vector_score": c.vector_score,
                "keyword_score": c.keyword_score,
                "char_span": c.char_span,
            })
        })
        .collect();
    to_pretty(&output)
}

pub fn format_regressions(regressions: &[Regression]) -> String {
    to_pretty(&serde_json::json!({
        "regressed": !regressions.is_empty(),
        "regressions": regressions,
    }))
}
