//! Core data types shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};

/// Raw extracted text plus the name of the file it came from.
///
/// Produced by the extraction collaborator and consumed only by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Originating filename (e.g. `resume.pdf`).
    pub source: String,
    /// Full extracted text.
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A bounded-length segment of a [`Document`], the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Random UUID assigned at chunking time.
    pub id: String,
    /// Source identifier inherited from the parent document.
    pub source: String,
    /// Zero-based position within the parent document.
    pub chunk_index: i64,
    /// Chunk text (never empty or whitespace-only).
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned by the retriever together with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Dot product of the unit query and chunk vectors.
    pub score: f32,
}

/// A chunk paired with its unit-length embedding vector, as written to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Metadata persisted alongside an index.
///
/// `model` and `dims` pin the embedding space the index was built in; queries
/// embedded with a different model are rejected rather than compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub collection: String,
    pub model: String,
    pub dims: usize,
    pub chunk_count: u64,
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// Unix timestamp (seconds) of the build.
    pub built_at: i64,
}

/// One answered question in the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub asked_at: i64,
}
