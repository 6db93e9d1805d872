//! Per-query lifecycle

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Pending,
    Embedding,
    Retrieving,
    Synthesizing,
    Answered,
    Degraded,
    Failed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answered | Self::Degraded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Embedding => "EMBEDDING",
            Self::Retrieving => "RETRIEVING",
            Self::Synthesizing => "SYNTHESIZING",
            Self::Answered => "ANSWERED",
            Self::Degraded => "DEGRADED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one query through its states.
///
/// `SYNTHESIZING` may be re-entered once per retry, up to `max_synthesis`
/// entries in total. Any non-terminal state may move to `FAILED`.
#[derive(Debug, Clone)]
pub struct QueryStateMachine {
    state: QueryState,
    history: Vec<QueryState>,
    synthesis_entries: u32,
    max_synthesis: u32,
}

impl QueryStateMachine {
    pub fn new(max_synthesis: u32) -> Self {
        Self {
            state: QueryState::Pending,
            history: vec![QueryState::Pending],
            synthesis_entries: 0,
            max_synthesis: max_synthesis.max(1),
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn history(&self) -> &[QueryState] {
        &self.history
    }

    pub fn synthesis_entries(&self) -> u32 {
        self.synthesis_entries
    }

    pub fn can_transition(&self, next: QueryState) -> bool {
        use QueryState::*;
        match (self.state, next) {
            (s, Failed) => !s.is_terminal(),
            (Pending, Embedding) | (Embedding, Retrieving) | (Retrieving, Synthesizing) => true,
            (Synthesizing, Synthesizing) => self.synthesis_entries < self.max_synthesis,
            (Synthesizing, Answered) | (Synthesizing, Degraded) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, next: QueryState) -> Result<()> {
        if !self.can_transition(next) {
            return Err(RagError::Other(anyhow::anyhow!(
                "illegal query state transition {} -> {}",
                self.state,
                next
            )));
        }
        if next == QueryState::Synthesizing {
            self.synthesis_entries += 1;
        }
        tracing::trace!(from = %self.state, to = %next, "Query state");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Move to `FAILED` from wherever the query is; a no-op once terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = QueryState::Failed;
            self.history.push(QueryState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use QueryState::*;

    fn advance(sm: &mut QueryStateMachine, states: &[QueryState]) {
        for &s in states {
            sm.transition(s).unwrap();
        }
    }

    #[test]
    fn test_happy_path() {
        let mut sm = QueryStateMachine::new(3);
        advance(&mut sm, &[Embedding, Retrieving, Synthesizing, Answered]);
        assert_eq!(sm.state(), Answered);
        assert_eq!(
            sm.history(),
            &[Pending, Embedding, Retrieving, Synthesizing, Answered]
        );
    }

    #[test]
    fn test_synthesis_loop_is_bounded() {
        let mut sm = QueryStateMachine::new(3);
        advance(
            &mut sm,
            &[Embedding, Retrieving, Synthesizing, Synthesizing, Synthesizing],
        );
        assert_eq!(sm.synthesis_entries(), 3);
        assert!(sm.transition(Synthesizing).is_err());
        sm.transition(Degraded).unwrap();
        assert!(sm.state().is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut sm = QueryStateMachine::new(3);
        assert!(sm.transition(Retrieving).is_err());
        assert!(sm.transition(Answered).is_err());
        assert_eq!(sm.state(), Pending);

        advance(&mut sm, &[Embedding, Retrieving]);
        assert!(sm.transition(Degraded).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut sm = QueryStateMachine::new(1);
        advance(&mut sm, &[Embedding, Retrieving, Synthesizing, Answered]);
        assert!(sm.transition(Failed).is_err());
        sm.fail();
        assert_eq!(sm.state(), Answered);
    }

    #[test]
    fn test_fail_from_any_active_state() {
        let mut sm = QueryStateMachine::new(3);
        sm.transition(Embedding).unwrap();
        sm.fail();
        assert_eq!(sm.state(), Failed);
        assert_eq!(sm.history().last(), Some(&Failed));
    }
}
