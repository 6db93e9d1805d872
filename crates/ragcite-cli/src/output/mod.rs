//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use ragcite_core::{
    DocumentSummary, EngineStatus, IngestReport, MetricsReport, Regression, RetrievedCandidate,
    SessionSummary, SessionTurn,
};

/// Paths skipped during ingestion, with the reason
pub struct Skipped {
    pub path: String,
    pub reason: String,
}

pub fn format_ingest(reports: &[IngestReport], skipped: &[Skipped], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_ingest(reports, skipped),
        OutputFormat::Cli => terminal::format_ingest(reports, skipped),
    }
}

pub fn format_documents(docs: &[DocumentSummary], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(&docs),
        OutputFormat::Cli => terminal::format_documents(docs),
    }
}

pub fn format_status(status: &EngineStatus, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(status),
        OutputFormat::Cli => terminal::format_status(status),
    }
}

pub fn format_candidates(candidates: &[RetrievedCandidate], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_candidates(candidates),
        OutputFormat::Cli => terminal::format_candidates(candidates),
    }
}

pub fn format_report(report: &MetricsReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(report),
        OutputFormat::Cli => terminal::format_report(report),
    }
}

pub fn format_regressions(regressions: &[Regression], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_regressions(regressions),
        OutputFormat::Cli => terminal::format_regressions(regressions),
    }
}

pub fn format_sessions(sessions: &[SessionSummary], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(sessions),
        OutputFormat::Cli => terminal::format_sessions(sessions),
    }
}

pub fn format_turns(turns: &[SessionTurn], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(turns),
        OutputFormat::Cli => terminal::format_turns(turns),
    }
}
