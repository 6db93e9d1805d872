//! Ingestion pipeline: chunk, embed (reusing stored vectors), index

use super::chunker::{Chunk, Chunker};
use super::keyword::KeywordIndex;
use super::vector::{VectorEntry, VectorIndex, VectorMetadata};
use crate::db::{embedding_key, hash_content, DocumentStore};
use crate::error::{ProviderError, RagError, Result};
use crate::llm::Embedder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// What ingestion did with a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Created,
    Updated,
    Unchanged,
}

/// Result of ingesting one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub status: IngestStatus,
    pub chunk_count: usize,
    /// Chunks sent to the embedding provider (through the cache)
    pub embedded_chunks: usize,
    /// Chunks whose stored vector was reused
    pub reused_chunks: usize,
    pub elapsed_ms: u64,
}

/// Writes documents into the corpus store and both indexes
pub struct IngestPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    documents: Arc<DocumentStore>,
    vectors: Arc<VectorIndex>,
    keywords: Arc<KeywordIndex>,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        documents: Arc<DocumentStore>,
        vectors: Arc<VectorIndex>,
        keywords: Arc<KeywordIndex>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            documents,
            vectors,
            keywords,
            batch_size: 32,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Ingest already-redacted text under `document_id`.
    ///
    /// Unchanged text embedded with the current model is a no-op; changed text
    /// replaces the previous chunk set in every store.
    pub async fn ingest(
        &self,
        document_id: &str,
        source_path: &str,
        raw_text: &str,
    ) -> Result<IngestReport> {
        let start = Instant::now();
        if document_id.trim().is_empty() {
            return Err(RagError::InvalidInput("document id must not be empty".into()));
        }
        if raw_text.trim().is_empty() {
            return Err(RagError::InvalidInput(format!(
                "document '{}' has no text",
                document_id
            )));
        }

        let model = self.embedder.model_name().to_string();
        let content_hash = hash_content(raw_text);
        let chunks = self.chunker.chunk(document_id, raw_text);
        let previous_hash = self.documents.content_hash(document_id)?;

        if previous_hash.as_deref() == Some(content_hash.as_str())
            && self.is_indexed(&chunks, &model)?
        {
            tracing::debug!(document_id, "Document unchanged, skipping");
            return Ok(IngestReport {
                document_id: document_id.to_string(),
                status: IngestStatus::Unchanged,
                chunk_count: chunks.len(),
                embedded_chunks: 0,
                reused_chunks: chunks.len(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        let (vectors, reused) = self.embed_chunks(&chunks, &model).await?;

        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorEntry {
                chunk_id: chunk.id.clone(),
                vector,
                metadata: VectorMetadata {
                    document_id: document_id.to_string(),
                    source_path: source_path.to_string(),
                    text: chunk.text.clone(),
                    char_span: chunk.char_span,
                    embedding_key: embedding_key(&chunk.text, &model),
                    model: model.clone(),
                },
            })
            .collect();
        let keyword_rows: Vec<(String, String, String)> = chunks
            .iter()
            .map(|c| (c.id.clone(), document_id.to_string(), c.text.clone()))
            .collect();

        self.vectors.delete_document(document_id)?;
        self.keywords.delete_document(document_id)?;
        self.vectors.add_batch(entries)?;
        self.keywords.add_batch(&keyword_rows)?;
        self.documents
            .upsert_document(document_id, source_path, raw_text, &content_hash, &chunks)?;

        let status = if previous_hash.is_some() {
            IngestStatus::Updated
        } else {
            IngestStatus::Created
        };
        let report = IngestReport {
            document_id: document_id.to_string(),
            status,
            chunk_count: chunks.len(),
            embedded_chunks: chunks.len() - reused,
            reused_chunks: reused,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            document_id,
            status = ?report.status,
            chunks = report.chunk_count,
            embedded = report.embedded_chunks,
            reused = report.reused_chunks,
            "Ingested document"
        );
        Ok(report)
    }

    /// Remove a document from every store. Returns false if it was unknown.
    pub fn remove(&self, document_id: &str) -> Result<bool> {
        let vectors = self.vectors.delete_document(document_id)?;
        let keywords = self.keywords.delete_document(document_id)?;
        let existed = self.documents.remove_document(document_id)?;
        tracing::info!(document_id, vectors, keywords, existed, "Removed document");
        Ok(existed || vectors > 0 || keywords > 0)
    }

    /// True when every chunk has a vector for the current text and model
    fn is_indexed(&self, chunks: &[Chunk], model: &str) -> Result<bool> {
        for chunk in chunks {
            let key = embedding_key(&chunk.text, model);
            match self.vectors.get(&chunk.id)? {
                Some(meta) if meta.embedding_key == key => {}
                _ => return Ok(false),
            }
            if self.keywords.get(&chunk.id)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Vectors for `chunks` in order, plus how many came from the index
    async fn embed_chunks(&self, chunks: &[Chunk], model: &str) -> Result<(Vec<Vec<f32>>, usize)> {
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut pending: Vec<usize> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let stored = self
                .vectors
                .vector_for_key(&embedding_key(&chunk.text, model))?;
            if stored.is_none() {
                pending.push(i);
            }
            vectors.push(stored);
        }
        let reused = chunks.len() - pending.len();

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(ProviderError::invalid_response(format!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                ))
                .into());
            }
            for (&i, vector) in batch.iter().zip(embedded) {
                vectors[i] = Some(vector);
            }
        }

        let vectors = vectors
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ProviderError::invalid_response("missing chunk embedding"))?;
        Ok((vectors, reused))
    }
}
