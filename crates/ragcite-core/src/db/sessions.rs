//! Conversation history for multi-turn querying (`sessions.sqlite`)

use super::Database;
use crate::error::{RagError, Result};
use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const SESSIONS_FILE: &str = "sessions.sqlite";

/// Longest accepted session id
pub const MAX_SESSION_ID_LEN: usize = 128;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS session_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    mode TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_turns_session ON session_turns(session_id, id);
"#;

/// One answered question in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTurn {
    pub question: String,
    pub answer: String,
    /// `synthesized` or `degraded`
    pub mode: String,
    pub created_at: String,
}

/// Session listing entry
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub turns: usize,
    pub last_question: String,
    pub last_active_at: String,
}

/// Fails with `InvalidInput` for empty, padded or overlong ids
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(RagError::InvalidInput("session id must not be empty".into()));
    }
    if session_id.trim() != session_id {
        return Err(RagError::InvalidInput(
            "session id must not start or end with whitespace".into(),
        ));
    }
    if session_id.chars().count() > MAX_SESSION_ID_LEN {
        return Err(RagError::InvalidInput(format!(
            "session id longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}

/// Question and answer history keyed by a caller-chosen session id
pub struct SessionStore {
    db: Mutex<Database>,
}

impl SessionStore {
    /// Open or create the session store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(Self::file_path(dir), CREATE_TABLES)?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(CREATE_TABLES)?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn file_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(SESSIONS_FILE)
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| RagError::Search("session store lock poisoned".into()))
    }

    /// Append a turn and return its row id
    pub fn add_turn(&self, session_id: &str, question: &str, answer: &str, mode: &str) -> Result<i64> {
        validate_session_id(session_id)?;
        let now = Utc::now().to_rfc3339();
        let db = self.db()?;
        db.conn.execute(
            "INSERT INTO session_turns (session_id, question, answer, mode, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, question, answer, mode, now],
        )?;
        Ok(db.conn.last_insert_rowid())
    }

    /// The most recent `limit` turns, oldest first
    pub fn history(&self, session_id: &str, limit: usize) -> Result<Vec<SessionTurn>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = self.db()?;
        let mut stmt = db.conn.prepare(
            "SELECT question, answer, mode, created_at
             FROM session_turns WHERE session_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let mut turns = stmt
            .query_map(params![session_id, limit as i64], |row| {
                Ok(SessionTurn {
                    question: row.get(0)?,
                    answer: row.get(1)?,
                    mode: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Sessions by most recent activity
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let db = self.db()?;
        let mut stmt = db.conn.prepare(
            "SELECT t.session_id, g.turns, t.question, t.created_at
             FROM session_turns t
             JOIN (
                 SELECT session_id, MAX(id) AS last_id, COUNT(*) AS turns
                 FROM session_turns GROUP BY session_id
             ) g ON g.last_id = t.id
             ORDER BY t.id DESC
             LIMIT ?1",
        )?;

        let sessions = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SessionSummary {
                    id: row.get(0)?,
                    turns: row.get::<_, i64>(1)? as usize,
                    last_question: row.get(2)?,
                    last_active_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Delete every turn of a session and return how many were removed
    pub fn delete_session(&self, session_id: &str) -> Result<usize> {
        let deleted = self.db()?.conn.execute(
            "DELETE FROM session_turns WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_chronological_and_limited() {
        let store = SessionStore::open_in_memory().unwrap();
        for i in 1..=4 {
            store
                .add_turn("s1", &format!("q{}", i), &format!("a{}", i), "synthesized")
                .unwrap();
        }
        store.add_turn("s2", "other", "answer", "degraded").unwrap();

        let turns = store.history("s1", 2).unwrap();
        let questions: Vec<_> = turns.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q3", "q4"]);
        assert_eq!(turns[1].answer, "a4");

        assert!(store.history("s1", 0).unwrap().is_empty());
        assert!(store.history("missing", 5).unwrap().is_empty());
    }

    #[test]
    fn test_list_sessions_most_recent_first() {
        let store = SessionStore::open_in_memory().unwrap();
        store.add_turn("s1", "first", "a", "synthesized").unwrap();
        store.add_turn("s2", "second", "b", "synthesized").unwrap();
        store.add_turn("s1", "third", "c", "degraded").unwrap();

        let sessions = store.list_sessions(10).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "s1");
        assert_eq!(sessions[0].turns, 2);
        assert_eq!(sessions[0].last_question, "third");
        assert_eq!(sessions[1].id, "s2");

        assert_eq!(store.list_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_session() {
        let store = SessionStore::open_in_memory().unwrap();
        store.add_turn("s1", "q", "a", "synthesized").unwrap();
        store.add_turn("s1", "q2", "a2", "synthesized").unwrap();
        store.add_turn("s2", "q", "a", "synthesized").unwrap();

        assert_eq!(store.delete_session("s1").unwrap(), 2);
        assert_eq!(store.delete_session("s1").unwrap(), 0);
        assert!(store.history("s1", 5).unwrap().is_empty());
        assert_eq!(store.history("s2", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::open(dir.path()).unwrap();
            store.add_turn("s1", "q", "a", "synthesized").unwrap();
        }
        let store = SessionStore::open(dir.path()).unwrap();
        assert_eq!(store.history("s1", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("chat-42").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(" padded ").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());

        let store = SessionStore::open_in_memory().unwrap();
        assert!(matches!(
            store.add_turn("  ", "q", "a", "synthesized"),
            Err(RagError::InvalidInput(_))
        ));
    }
}
