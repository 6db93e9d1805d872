//! Indexing pipeline
//!
//! Chunking, tokenization, the vector and keyword indexes, and ingestion.

pub mod chunker;
pub mod ingest;
pub mod keyword;
pub mod tokenize;
pub mod vector;

pub use chunker::{chunk_text, CharSpan, Chunk, Chunker};
pub use ingest::{IngestPipeline, IngestReport, IngestStatus};
pub use keyword::KeywordIndex;
pub use vector::{VectorEntry, VectorIndex, VectorMetadata};
