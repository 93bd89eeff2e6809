//! Embedding collaborator trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! plus pure helpers for normalization, similarity and BLOB serialization.
//!
//! Concrete providers (Ollama, OpenAI, fastembed) live in the `docqa` app
//! crate.

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};

/// An external embedding model.
///
/// Implementations map a batch of texts to one vector per text, in input
/// order. Vectors need not be normalized; the index and retriever normalize
/// everything they receive.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in the index (e.g. `"bge-small-en-v1.5"`).
    fn model_name(&self) -> &str;

    /// Expected vector dimensionality, or `0` if not known up front.
    fn dims(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> PipelineResult<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::EmbeddingUnavailable("empty embedding response".to_string()))
}

/// Scale `vec` to unit length in place. Zero vectors are left untouched.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in vec.iter_mut() {
        *x /= norm;
    }
}

/// Dot product. Equals cosine similarity when both inputs are unit vectors.
///
/// Returns `0.0` for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use docqa_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
