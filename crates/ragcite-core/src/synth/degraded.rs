//! Retrieval-only answers for when synthesis is unavailable

use super::{source_marker, Citation};
use crate::search::RetrievedCandidate;
use std::fmt::Write;

pub const DEGRADED_BANNER: &str =
    "DEGRADED MODE: answer synthesis is temporarily unavailable. \
     The most relevant source passages are shown below without a generated answer.";

/// Render the passages that would have been sent to the LLM.
///
/// Each excerpt is cut to `excerpt_chars` characters. No generated text is
/// included, only the banner, the question and the labelled passages.
pub fn render_degraded(
    query: &str,
    sources: &[RetrievedCandidate],
    excerpt_chars: usize,
) -> (String, Vec<Citation>) {
    let mut body = String::new();
    let _ = writeln!(body, "{}", DEGRADED_BANNER);
    let _ = writeln!(body);
    let _ = writeln!(body, "Question: {}", query.trim());
    let _ = writeln!(body);
    let _ = writeln!(body, "Relevant passages:");

    let mut citations = Vec::with_capacity(sources.len());
    for (i, candidate) in sources.iter().enumerate() {
        let marker = source_marker(i + 1);
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "[{}] {} (chars {}-{})",
            marker, candidate.source_path, candidate.char_span.start, candidate.char_span.end
        );
        let _ = writeln!(body, "{}", excerpt(&candidate.text, excerpt_chars));

        citations.push(Citation {
            marker,
            chunk_id: candidate.chunk_id.clone(),
            source_path: candidate.source_path.clone(),
            char_span: candidate.char_span,
        });
    }

    (body.trim_end().to_string(), citations)
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}
