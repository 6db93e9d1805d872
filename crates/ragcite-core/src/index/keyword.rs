//! Persistent BM25 keyword index (`keywords.sqlite`)
//!
//! SQLite holds the chunk text; the inverted index is rebuilt in memory on
//! open. Same locking discipline as the vector index.

use crate::db::Database;
use crate::error::{RagError, Result};
use crate::index::tokenize::tokenize;
use chrono::Utc;
use rusqlite::params;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const KEYWORD_FILE: &str = "keywords.sqlite";

/// BM25 term-frequency saturation
pub const BM25_K1: f64 = 1.2;
/// BM25 length normalization
pub const BM25_B: f64 = 0.75;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS keyword_chunks (
    chunk_id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_keyword_chunks_document ON keyword_chunks(document_id);
"#;

struct IndexedChunk {
    document_id: String,
    text: String,
    term_freqs: HashMap<String, u32>,
    length: usize,
}

impl IndexedChunk {
    fn new(document_id: String, text: String) -> Self {
        let tokens = tokenize(&text);
        let length = tokens.len();
        let mut term_freqs = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        Self {
            document_id,
            text,
            term_freqs,
            length,
        }
    }
}

#[derive(Default)]
struct KeywordState {
    chunks: HashMap<String, IndexedChunk>,
    postings: HashMap<String, HashSet<String>>,
    total_length: usize,
}

impl KeywordState {
    fn insert(&mut self, chunk_id: String, chunk: IndexedChunk) {
        self.remove(&chunk_id);
        for term in chunk.term_freqs.keys() {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(chunk_id.clone());
        }
        self.total_length += chunk.length;
        self.chunks.insert(chunk_id, chunk);
    }

    fn remove(&mut self, chunk_id: &str) -> bool {
        let Some(chunk) = self.chunks.remove(chunk_id) else {
            return false;
        };
        for term in chunk.term_freqs.keys() {
            if let Some(ids) = self.postings.get_mut(term) {
                ids.remove(chunk_id);
                if ids.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        self.total_length -= chunk.length;
        true
    }

    fn idf(&self, doc_freq: usize) -> f64 {
        let n = self.chunks.len() as f64;
        let df = doc_freq as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

pub struct KeywordIndex {
    state: RwLock<KeywordState>,
    db: Mutex<Database>,
}

impl KeywordIndex {
    /// Open or create the index in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(Self::file_path(dir), CREATE_TABLES)?;
        Self::load(db)
    }

    /// Open an index that must already exist and validate
    pub fn open_existing(dir: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open_existing(Self::file_path(dir), CREATE_TABLES)?;
        Self::load(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(CREATE_TABLES)?;
        Self::load(db)
    }

    pub fn file_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(KEYWORD_FILE)
    }

    fn load(db: Database) -> Result<Self> {
        let mut state = KeywordState::default();
        {
            let mut stmt = db
                .conn
                .prepare("SELECT chunk_id, document_id, text FROM keyword_chunks")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let chunk_id: String = row.get(0)?;
                let chunk = IndexedChunk::new(row.get(1)?, row.get(2)?);
                state.insert(chunk_id, chunk);
            }
        }

        tracing::debug!(
            path = %db.path().display(),
            chunks = state.chunks.len(),
            terms = state.postings.len(),
            "Loaded keyword index"
        );

        Ok(Self {
            state: RwLock::new(state),
            db: Mutex::new(db),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, KeywordState>> {
        self.state
            .read()
            .map_err(|e| RagError::Search(format!("keyword index lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, KeywordState>> {
        self.state
            .write()
            .map_err(|e| RagError::Search(format!("keyword index lock poisoned: {}", e)))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| RagError::Search(format!("keyword store lock poisoned: {}", e)))
    }

    /// Add or replace a chunk
    pub fn add(&self, chunk_id: &str, document_id: &str, text: &str) -> Result<()> {
        self.add_batch(&[(chunk_id.to_string(), document_id.to_string(), text.to_string())])
    }

    /// Add or replace `(chunk_id, document_id, text)` rows atomically
    pub fn add_batch(&self, rows: &[(String, String, String)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut state = self.write()?;
        let now = Utc::now().to_rfc3339();
        self.db()?.transaction(|conn| {
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO keyword_chunks (chunk_id, document_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (chunk_id, document_id, text) in rows {
                stmt.execute(params![chunk_id, document_id, text, now])?;
            }
            Ok(())
        })?;

        for (chunk_id, document_id, text) in rows {
            state.insert(
                chunk_id.clone(),
                IndexedChunk::new(document_id.clone(), text.clone()),
            );
        }
        Ok(())
    }

    /// Top `k` chunks by BM25 score, descending; ties broken by chunk id.
    /// Chunks sharing no term with the query are not returned.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<(String, f32)>> {
        let state = self.read()?;
        if k == 0 || state.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let mut terms = tokenize(text);
        terms.sort();
        terms.dedup();

        let avg_len = (state.total_length as f64 / state.chunks.len() as f64).max(1.0);
        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in &terms {
            let Some(ids) = state.postings.get(term) else {
                continue;
            };
            let idf = state.idf(ids.len());
            for id in ids {
                let Some(chunk) = state.chunks.get(id) else {
                    continue;
                };
                let tf = chunk.term_freqs.get(term).copied().unwrap_or(0) as f64;
                let norm = 1.0 - BM25_B + BM25_B * chunk.length as f64 / avg_len;
                let score = idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm);
                *scores.entry(id.as_str()).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(&str, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(k);
        Ok(ranked
            .into_iter()
            .map(|(id, score)| (id.to_string(), score as f32))
            .collect())
    }

    /// Remove a chunk. Returns false if it was not present.
    pub fn delete(&self, chunk_id: &str) -> Result<bool> {
        let mut state = self.write()?;
        let rows = self.db()?.conn.execute(
            "DELETE FROM keyword_chunks WHERE chunk_id = ?1",
            params![chunk_id],
        )?;
        let removed = state.remove(chunk_id);
        Ok(removed || rows > 0)
    }

    /// Remove every chunk belonging to a document
    pub fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.write()?;
        self.db()?.conn.execute(
            "DELETE FROM keyword_chunks WHERE document_id = ?1",
            params![document_id],
        )?;
        let ids: Vec<String> = state
            .chunks
            .iter()
            .filter(|(_, c)| c.document_id == document_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            state.remove(id);
        }
        Ok(ids.len())
    }

    /// Stored `(document_id, text)` for a chunk
    pub fn get(&self, chunk_id: &str) -> Result<Option<(String, String)>> {
        Ok(self
            .read()?
            .chunks
            .get(chunk_id)
            .map(|c| (c.document_id.clone(), c.text.clone())))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.chunks.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sorted chunk ids
    pub fn chunk_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.read()?.chunks.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
