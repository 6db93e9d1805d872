//! Answer synthesis
//!
//! Turns retrieved candidates into a cited [`Answer`]. The LLM call is
//! retried on transient failures; when every attempt fails the degraded
//! responder returns the source passages instead of generated prose.

pub mod citations;
pub mod degraded;
pub mod state;
mod synthesizer;

pub use citations::{ground_citations, GroundedText};
pub use degraded::{render_degraded, DEGRADED_BANNER};
pub use state::{QueryState, QueryStateMachine};
pub use synthesizer::{SynthesisOutcome, Synthesizer, INSUFFICIENT_INFORMATION};

use crate::index::chunker::CharSpan;
use serde::{Deserialize, Serialize};

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Synthesized,
    Degraded,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthesized => "synthesized",
            Self::Degraded => "degraded",
        }
    }
}

/// Reference from an answer to a passage that was sent with the prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Marker as it appears in the answer text, e.g. `S1`
    pub marker: String,
    pub chunk_id: String,
    pub source_path: String,
    pub char_span: CharSpan,
}

/// Result of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub mode: AnswerMode,
    pub latency_ms: u64,
}

impl Answer {
    pub fn is_degraded(&self) -> bool {
        self.mode == AnswerMode::Degraded
    }
}

/// Marker for the 1-based source position `n`
pub fn source_marker(n: usize) -> String {
    format!("S{}", n)
}
