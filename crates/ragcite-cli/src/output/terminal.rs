//! Terminal output formatter

use super::Skipped;
use ragcite_core::{
    Answer, AnswerMode, DocumentSummary, EngineStatus, IngestReport, MetricsReport, Regression,
    RetrievedCandidate, SessionSummary, SessionTurn,
};
use std::io::{IsTerminal, Write};
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Print an answer with its sources, colouring the mode label
pub fn print_answer(answer: &Answer) -> std::io::Result<()> {
    let choice = if std::io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let writer = BufferWriter::stdout(choice);
    let mut buf = writer.buffer();

    writeln!(buf, "{}", answer.text.trim_end())?;
    if !answer.citations.is_empty() {
        writeln!(buf)?;
        writeln!(buf, "Sources:")?;
        for c in &answer.citations {
            writeln!(
                buf,
                "  [{}] {} (chars {}-{}) {}",
                c.marker, c.source_path, c.char_span.start, c.char_span.end, c.chunk_id
            )?;
        }
    }
    writeln!(buf)?;

    let color = match answer.mode {
        AnswerMode::Synthesized => Color::Green,
        AnswerMode::Degraded => Color::Yellow,
    };
    buf.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(buf, "{}", answer.mode.as_str())?;
    buf.reset()?;
    writeln!(buf, " in {} ms", answer.latency_ms)?;

    writer.print(&buf)
}

pub fn format_ingest(reports: &[IngestReport], skipped: &[Skipped]) -> String {
    let mut output = String::new();
    for r in reports {
        output.push_str(&format!(
            "{:<9} {} ({} chunks, {} embedded, {} reused)\n",
            format!("{:?}", r.status).to_lowercase(),
            r.document_id,
            r.chunk_count,
            r.embedded_chunks,
            r.reused_chunks
        ));
    }
    for s in skipped {
        output.push_str(&format!("skipped   {}: {}\n", s.path, s.reason));
    }
    output
}

pub fn format_documents(docs: &[DocumentSummary]) -> String {
    let mut output = String::new();
    for d in docs {
        output.push_str(&format!(
            "{} {} ({} chunks, {} chars)\n",
            d.id, d.source_path, d.chunk_count, d.char_count
        ));
    }
    output
}

pub fn format_status(s: &EngineStatus) -> String {
    let dims = s
        .dimensions
        .map_or_else(|| "-".to_string(), |d| d.to_string());
    let mut out = String::new();
    out.push_str(&format!("Documents:       {}\n", s.documents));
    out.push_str(&format!("Chunks:          {}\n", s.chunks));
    out.push('\n');
    out.push_str("Indexes:\n");
    out.push_str(&format!("  Vector:        {} ({})\n", s.vector_entries, s.vector_path.display()));
    out.push_str(&format!("  Keyword:       {} ({})\n", s.keyword_entries, s.keyword_path.display()));
    out.push_str(&format!("  Corpus:        {}\n", s.corpus_path.display()));
    out.push_str(&format!("  Sessions:      {}\n", s.session_path.display()));
    out.push('\n');
    out.push_str("Embedding:\n");
    out.push_str(&format!("  Model:         {}\n", s.embedding_model));
    out.push_str(&format!("  Dimensions:    {}\n", dims));
    out.push_str(&format!(
        "  Cache:         {}/{} entries, {:.1}% hit rate\n",
        s.cache.size,
        s.cache.capacity,
        s.cache.hit_rate * 100.0
    ));
    out
}

pub fn format_candidates(candidates: &[RetrievedCandidate]) -> String {
    let mut output = String::new();
    for c in candidates {
        output.push_str(&format!(
            "{:>2}. {:.3} {} #{} (vector {:.3}, keyword {:.3})\n",
            c.rank, c.fused_score, c.source_path, c.chunk_id, c.vector_score, c.keyword_score
        ));
        let preview: String = c.text.chars().take(160).collect();
        output.push_str(&format!("    {}\n", preview.replace('\n', " ")));
    }
    output
}

pub fn format_report(report: &MetricsReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Queries:         {} ({})\n",
        report.query_count, report.settings.embedding_model
    ));
    out.push_str(&format!(
        "Weights:         vector {:.2} / keyword {:.2}\n",
        report.settings.vector_weight, report.settings.keyword_weight
    ));
    out.push('\n');
    for (k, recall) in &report.mean_recall_at_k {
        out.push_str(&format!("Recall@{:<9}{:.4}\n", k, recall));
    }
    out.push_str(&format!("MRR:             {:.4}\n", report.mrr));
    out.push('\n');
    let l = &report.latency_ms;
    out.push_str(&format!(
        "Latency (ms):    p50 {:.1}  p95 {:.1}  p99 {:.1}  max {:.1}\n",
        l.p50, l.p95, l.p99, l.max
    ));
    out
}

pub fn format_regressions(regressions: &[Regression]) -> String {
    if regressions.is_empty() {
        return "No regressions\n".to_string();
    }
    let mut out = format!("{} regression(s):\n", regressions.len());
    for r in regressions {
        out.push_str(&format!("  {}\n", r));
    }
    out
}

pub fn format_sessions(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "No sessions\n".to_string();
    }
    let mut output = String::new();
    for s in sessions {
        let preview: String = s.last_question.chars().take(60).collect();
        output.push_str(&format!(
            "{} ({} turns, last {}) {}\n",
            s.id, s.turns, s.last_active_at, preview
        ));
    }
    output
}

pub fn format_turns(turns: &[SessionTurn]) -> String {
    let mut output = String::new();
    for t in turns {
        output.push_str(&format!("[{}] {}\n", t.created_at, t.mode));
        output.push_str(&format!("Q: {}\n", t.question));
        output.push_str(&format!("A: {}\n\n", t.answer.trim_end()));
    }
    output
}
