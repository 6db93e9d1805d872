//! Database layer for ragcite
//!
//! Each persisted store is its own SQLite file with a `meta` table:
//! - `corpus.sqlite`: documents and chunks
//! - `vectors.sqlite`: chunk embeddings (see `index::vector`)
//! - `keywords.sqlite`: chunk text for BM25 (see `index::keyword`)
//! - `sessions.sqlite`: per-session question and answer history

mod content;
mod documents;
mod schema;
mod sessions;
pub mod vectors;

pub use content::{embedding_key, hash_content};
pub use documents::{Document, DocumentStore, DocumentSummary, CORPUS_FILE};
pub use schema::{Database, SCHEMA_VERSION};
pub use sessions::{
    validate_session_id, SessionStore, SessionSummary, SessionTurn, MAX_SESSION_ID_LEN, SESSIONS_FILE,
};
