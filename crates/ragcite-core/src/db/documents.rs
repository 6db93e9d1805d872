//! Document and chunk storage (`corpus.sqlite`)

use super::Database;
use crate::error::{RagError, Result};
use crate::index::chunker::{CharSpan, Chunk};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const CORPUS_FILE: &str = "corpus.sqlite";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    source_path TEXT NOT NULL,
    raw_text TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    text TEXT NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    UNIQUE(document_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
"#;

/// Document record from database
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub source_path: String,
    pub raw_text: String,
    pub content_hash: String,
    pub ingested_at: String,
}

/// Document listing entry without the body
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub source_path: String,
    pub content_hash: String,
    pub ingested_at: String,
    pub chunk_count: usize,
    pub char_count: usize,
}

/// Corpus of ingested documents and their chunks
pub struct DocumentStore {
    db: Mutex<Database>,
}

impl DocumentStore {
    /// Open or create the corpus store in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(Self::file_path(dir), CREATE_TABLES)?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an existing corpus store
    pub fn open_existing(dir: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open_existing(Self::file_path(dir), CREATE_TABLES)?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(CREATE_TABLES)?;
        Ok(Self { db: Mutex::new(db) })
    }

    pub fn file_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(CORPUS_FILE)
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| RagError::Search("corpus store lock poisoned".into()))
    }

    /// Insert or replace a document together with its chunks
    pub fn upsert_document(
        &self,
        id: &str,
        source_path: &str,
        raw_text: &str,
        content_hash: &str,
        chunks: &[Chunk],
    ) -> Result<Document> {
        let now = Utc::now().to_rfc3339();
        let db = self.db()?;
        db.transaction(|conn| {
            // cascade drops the previous chunk set
            conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            conn.execute(
                "INSERT INTO documents (id, source_path, raw_text, content_hash, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, source_path, raw_text, content_hash, now],
            )?;
            let mut stmt = conn.prepare(
                "INSERT INTO chunks (id, document_id, seq, text, char_start, char_end)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    id,
                    chunk.sequence_index as i64,
                    chunk.text,
                    chunk.char_span.start as i64,
                    chunk.char_span.end as i64
                ])?;
            }
            Ok(())
        })?;

        Ok(Document {
            id: id.to_string(),
            source_path: source_path.to_string(),
            raw_text: raw_text.to_string(),
            content_hash: content_hash.to_string(),
            ingested_at: now,
        })
    }

    /// Delete a document; its chunks cascade. Returns false if it did not exist.
    pub fn remove_document(&self, id: &str) -> Result<bool> {
        let rows = self
            .db()?
            .conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let db = self.db()?;
        let doc = db
            .conn
            .query_row(
                "SELECT id, source_path, raw_text, content_hash, ingested_at
                 FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Document {
                        id: row.get(0)?,
                        source_path: row.get(1)?,
                        raw_text: row.get(2)?,
                        content_hash: row.get(3)?,
                        ingested_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(doc)
    }

    /// Content hash of a stored document, if present
    pub fn content_hash(&self, id: &str) -> Result<Option<String>> {
        let db = self.db()?;
        let hash = db
            .conn
            .query_row(
                "SELECT content_hash FROM documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let db = self.db()?;
        let mut stmt = db.conn.prepare(
            "SELECT d.id, d.source_path, d.content_hash, d.ingested_at,
                    (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id),
                    LENGTH(d.raw_text)
             FROM documents d
             ORDER BY d.id",
        )?;
        let docs = stmt
            .query_map([], |row| {
                Ok(DocumentSummary {
                    id: row.get(0)?,
                    source_path: row.get(1)?,
                    content_hash: row.get(2)?,
                    ingested_at: row.get(3)?,
                    chunk_count: row.get::<_, i64>(4)? as usize,
                    char_count: row.get::<_, i64>(5)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let db = self.db()?;
        let mut stmt = db.conn.prepare(
            "SELECT id, document_id, seq, text, char_start, char_end
             FROM chunks WHERE document_id = ?1 ORDER BY seq",
        )?;
        let chunks = stmt
            .query_map(params![document_id], chunk_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }

    /// Look up chunks and the source path of their document
    pub fn chunks_by_ids(&self, ids: &[String]) -> Result<HashMap<String, (Chunk, String)>> {
        let db = self.db()?;
        let mut stmt = db.conn.prepare(
            "SELECT c.id, c.document_id, c.seq, c.text, c.char_start, c.char_end, d.source_path
             FROM chunks c JOIN documents d ON d.id = c.document_id
             WHERE c.id = ?1",
        )?;
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((chunk_from_row(row)?, row.get::<_, String>(6)?))
                })
                .optional()?;
            if let Some(entry) = row {
                found.insert(id.clone(), entry);
            }
        }
        Ok(found)
    }

    pub fn count_documents(&self) -> Result<usize> {
        let db = self.db()?;
        let n: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_chunks(&self) -> Result<usize> {
        let db = self.db()?;
        let n: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.db()?.get_meta(key)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.db()?.set_meta(key, value)
    }
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        sequence_index: row.get::<_, i64>(2)? as usize,
        text: row.get(3)?,
        char_span: CharSpan {
            start: row.get::<_, i64>(4)? as usize,
            end: row.get::<_, i64>(5)? as usize,
        },
    })
}
