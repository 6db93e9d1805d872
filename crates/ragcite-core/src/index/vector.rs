//! Persistent brute-force vector index (`vectors.sqlite`)
//!
//! Vectors live in memory behind an `RwLock` so queries run concurrently;
//! `add`/`delete` take the write lock and write through to SQLite before the
//! in-memory map changes, so a query never observes a half-applied update.

use crate::config::SimilarityMetric;
use crate::db::vectors::{bytes_to_embedding, dot_product, embedding_to_bytes};
use crate::db::Database;
use crate::error::{RagError, Result};
use crate::index::chunker::CharSpan;
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const VECTOR_FILE: &str = "vectors.sqlite";

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS vectors (
    chunk_id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    source_path TEXT NOT NULL,
    text TEXT NOT NULL,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    embedding_key TEXT NOT NULL,
    model TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vectors_document ON vectors(document_id);
CREATE INDEX IF NOT EXISTS idx_vectors_key ON vectors(embedding_key);
"#;

/// Chunk metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub document_id: String,
    pub source_path: String,
    pub text: String,
    pub char_span: CharSpan,
    /// Embedding key of `(text, model)`, see `db::embedding_key`
    pub embedding_key: String,
    pub model: String,
}

/// One vector to add
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

struct StoredVector {
    vector: Vec<f32>,
    norm: f32,
    metadata: VectorMetadata,
}

impl StoredVector {
    fn new(vector: Vec<f32>, metadata: VectorMetadata) -> Self {
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        Self {
            vector,
            norm,
            metadata,
        }
    }
}

#[derive(Default)]
struct VectorState {
    entries: HashMap<String, StoredVector>,
    dimensions: Option<usize>,
}

pub struct VectorIndex {
    state: RwLock<VectorState>,
    db: Mutex<Database>,
    metric: SimilarityMetric,
}

impl VectorIndex {
    /// Open or create the index in `dir`
    pub fn open(dir: impl AsRef<Path>, metric: SimilarityMetric) -> Result<Self> {
        let db = Database::open(Self::file_path(dir), CREATE_TABLES)?;
        Self::load(db, metric)
    }

    /// Open an index that must already exist and validate
    pub fn open_existing(dir: impl AsRef<Path>, metric: SimilarityMetric) -> Result<Self> {
        let db = Database::open_existing(Self::file_path(dir), CREATE_TABLES)?;
        Self::load(db, metric)
    }

    pub fn open_in_memory(metric: SimilarityMetric) -> Result<Self> {
        let db = Database::open_in_memory(CREATE_TABLES)?;
        Self::load(db, metric)
    }

    pub fn file_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(VECTOR_FILE)
    }

    fn load(db: Database, metric: SimilarityMetric) -> Result<Self> {
        let dimensions = match db.get_meta("dimensions")? {
            Some(d) => Some(
                d.parse::<usize>()
                    .map_err(|_| db.corrupt(format!("unparseable dimensions '{}'", d)))?,
            ),
            None => None,
        };

        match db.get_meta("metric")? {
            Some(stored) if stored != metric.as_str() => {
                tracing::info!(
                    stored = %stored,
                    configured = metric.as_str(),
                    "Similarity metric changed, vectors are reused as-is"
                );
                db.set_meta("metric", metric.as_str())?;
            }
            Some(_) => {}
            None => db.set_meta("metric", metric.as_str())?,
        }

        let mut entries = HashMap::new();
        {
            let mut stmt = db.conn.prepare(
                "SELECT chunk_id, document_id, source_path, text, char_start, char_end,
                        embedding_key, model, embedding
                 FROM vectors",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let chunk_id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(8)?;
                let vector = bytes_to_embedding(&blob).ok_or_else(|| {
                    db.corrupt(format!("vector for '{}' has a truncated blob", chunk_id))
                })?;
                if Some(vector.len()) != dimensions {
                    return Err(db.corrupt(format!(
                        "vector for '{}' has {} dimensions, index records {:?}",
                        chunk_id,
                        vector.len(),
                        dimensions
                    )));
                }
                let metadata = VectorMetadata {
                    document_id: row.get(1)?,
                    source_path: row.get(2)?,
                    text: row.get(3)?,
                    char_span: CharSpan {
                        start: row.get::<_, i64>(4)? as usize,
                        end: row.get::<_, i64>(5)? as usize,
                    },
                    embedding_key: row.get(6)?,
                    model: row.get(7)?,
                };
                entries.insert(chunk_id, StoredVector::new(vector, metadata));
            }
        }

        tracing::debug!(
            path = %db.path().display(),
            vectors = entries.len(),
            "Loaded vector index"
        );

        Ok(Self {
            state: RwLock::new(VectorState {
                entries,
                dimensions,
            }),
            db: Mutex::new(db),
            metric,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, VectorState>> {
        self.state
            .read()
            .map_err(|e| RagError::Search(format!("vector index lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, VectorState>> {
        self.state
            .write()
            .map_err(|e| RagError::Search(format!("vector index lock poisoned: {}", e)))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| RagError::Search(format!("vector store lock poisoned: {}", e)))
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn dimensions(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dimensions)
    }

    /// Add or replace a single vector
    pub fn add(&self, chunk_id: &str, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        self.add_batch(vec![VectorEntry {
            chunk_id: chunk_id.to_string(),
            vector,
            metadata,
        }])
    }

    /// Add or replace vectors atomically
    pub fn add_batch(&self, entries: Vec<VectorEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.write()?;
        let dims = state.dimensions.unwrap_or(entries[0].vector.len());
        for entry in &entries {
            if entry.vector.is_empty() {
                return Err(RagError::InvalidInput(format!(
                    "empty vector for chunk '{}'",
                    entry.chunk_id
                )));
            }
            if entry.vector.len() != dims {
                return Err(RagError::InvalidInput(format!(
                    "vector for chunk '{}' has {} dimensions, index expects {}",
                    entry.chunk_id,
                    entry.vector.len(),
                    dims
                )));
            }
            if entry.vector.iter().any(|x| !x.is_finite()) {
                return Err(RagError::InvalidInput(format!(
                    "vector for chunk '{}' contains non-finite values",
                    entry.chunk_id
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        let db = self.db()?;
        db.transaction(|conn| {
            if state.dimensions.is_none() {
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('dimensions', ?1)",
                    params![dims.to_string()],
                )?;
            }
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO vectors
                 (chunk_id, document_id, source_path, text, char_start, char_end,
                  embedding_key, model, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for entry in &entries {
                let m = &entry.metadata;
                stmt.execute(params![
                    entry.chunk_id,
                    m.document_id,
                    m.source_path,
                    m.text,
                    m.char_span.start as i64,
                    m.char_span.end as i64,
                    m.embedding_key,
                    m.model,
                    embedding_to_bytes(&entry.vector),
                    now
                ])?;
            }
            Ok(())
        })?;

        state.dimensions = Some(dims);
        for entry in entries {
            state
                .entries
                .insert(entry.chunk_id, StoredVector::new(entry.vector, entry.metadata));
        }
        Ok(())
    }

    /// Top `k` chunks by similarity, descending; ties broken by chunk id
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let state = self.read()?;
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if Some(vector.len()) != state.dimensions {
            return Err(RagError::InvalidInput(format!(
                "query vector has {} dimensions, index expects {:?}",
                vector.len(),
                state.dimensions
            )));
        }

        let query_norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mut scored: Vec<(&String, f32)> = state
            .entries
            .iter()
            .map(|(id, stored)| {
                let score = match self.metric {
                    SimilarityMetric::InnerProduct => dot_product(vector, &stored.vector),
                    SimilarityMetric::Cosine => {
                        if query_norm == 0.0 || stored.norm == 0.0 {
                            0.0
                        } else {
                            dot_product(vector, &stored.vector) / (query_norm * stored.norm)
                        }
                    }
                };
                (id, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(id, score)| (id.clone(), score))
            .collect())
    }

    /// Remove a vector. Returns false if it was not present.
    pub fn delete(&self, chunk_id: &str) -> Result<bool> {
        let mut state = self.write()?;
        let rows = self
            .db()?
            .conn
            .execute("DELETE FROM vectors WHERE chunk_id = ?1", params![chunk_id])?;
        let removed = state.entries.remove(chunk_id).is_some();
        Ok(removed || rows > 0)
    }

    /// Remove every vector belonging to a document
    pub fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.write()?;
        self.db()?.conn.execute(
            "DELETE FROM vectors WHERE document_id = ?1",
            params![document_id],
        )?;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, stored| stored.metadata.document_id != document_id);
        Ok(before - state.entries.len())
    }

    pub fn get(&self, chunk_id: &str) -> Result<Option<VectorMetadata>> {
        Ok(self
            .read()?
            .entries
            .get(chunk_id)
            .map(|stored| stored.metadata.clone()))
    }

    /// Stored vector for an embedding key, used to skip re-embedding unchanged text
    pub fn vector_for_key(&self, embedding_key: &str) -> Result<Option<Vec<f32>>> {
        Ok(self
            .read()?
            .entries
            .values()
            .find(|stored| stored.metadata.embedding_key == embedding_key)
            .map(|stored| stored.vector.clone()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Distinct embedding models present in the index
    pub fn models(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .read()?
            .entries
            .values()
            .map(|stored| stored.metadata.model.clone())
            .collect())
    }

    /// Sorted chunk ids
    pub fn chunk_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.read()?.entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
