//! Index lifecycle: full rebuild, open, count.
//!
//! A rebuild embeds every chunk first and only then hands the complete entry
//! set to [`IndexStore::replace`]. An embedding failure therefore never
//! touches the persisted index, and the store's replace is itself atomic for
//! readers.

use crate::chunk::ChunkParams;
use crate::embedding::{normalize, Embedder};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Chunk, IndexEntry, IndexMeta};
use crate::pipeline::IndexReport;
use crate::progress::{BuildEvent, BuildProgress};
use crate::store::IndexStore;

/// Identity and tuning of an index build.
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub collection: String,
    pub params: ChunkParams,
    /// Texts per embedding request.
    pub batch_size: usize,
}

/// Embed `chunks` and replace the persisted index with them.
///
/// # Errors
///
/// - [`PipelineError::EmptyInput`] if `chunks` is empty.
/// - [`PipelineError::EmbeddingUnavailable`] if the embedder fails or returns
///   malformed vectors. The previous index is untouched.
/// - [`PipelineError::Persistence`] if the store cannot write the new index.
pub async fn rebuild(
    store: &dyn IndexStore,
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    spec: &BuildSpec,
    progress: &dyn BuildProgress,
) -> PipelineResult<IndexMeta> {
    if chunks.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let total = chunks.len();
    let batch_size = spec.batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);
    let mut dims = 0usize;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;

        if embedded.len() != batch.len() {
            return Err(PipelineError::EmbeddingUnavailable(format!(
                "model returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            )));
        }

        for mut vector in embedded {
            if dims == 0 {
                dims = vector.len();
            }
            if vector.is_empty() || vector.len() != dims {
                return Err(PipelineError::EmbeddingUnavailable(format!(
                    "inconsistent embedding dimensions: expected {}, got {}",
                    dims,
                    vector.len()
                )));
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::EmbeddingUnavailable(
                    "model returned a vector with non-finite values".to_string(),
                ));
            }
            normalize(&mut vector);
            vectors.push(vector);
        }

        progress.report(BuildEvent::Embedding {
            n: vectors.len() as u64,
            total: total as u64,
        });
    }

    if embedder.dims() != 0 && embedder.dims() != dims {
        tracing::warn!(
            configured = embedder.dims(),
            actual = dims,
            model = embedder.model_name(),
            "embedding dimensions differ from configuration; recording actual value"
        );
    }

    let meta = IndexMeta {
        collection: spec.collection.clone(),
        model: embedder.model_name().to_string(),
        dims,
        chunk_count: total as u64,
        max_chars: spec.params.max_chars,
        overlap_chars: spec.params.overlap_chars,
        built_at: chrono::Utc::now().timestamp(),
    };

    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry { chunk, vector })
        .collect();

    store.replace(&meta, &entries).await?;
    progress.report(BuildEvent::Swapped {
        chunks: total as u64,
    });
    tracing::info!(
        location = %store.location(),
        chunks = total,
        model = %meta.model,
        dims,
        "index rebuilt"
    );

    Ok(meta)
}

/// Load the persisted index without recomputation.
///
/// Returns `None` (absent) when nothing is persisted or the index holds zero
/// entries; hard read failures are errors.
pub async fn open(store: &dyn IndexStore) -> PipelineResult<Option<IndexMeta>> {
    let Some(meta) = store.load_meta().await? else {
        return Ok(None);
    };
    if store.count().await? == 0 {
        return Ok(None);
    }
    Ok(Some(meta))
}

/// Number of stored chunk/vector pairs; `0` for an absent index.
pub async fn count(store: &dyn IndexStore) -> PipelineResult<u64> {
    store.count().await
}

/// Metadata, entry count and the first `limit` chunks, read without any
/// model involvement.
pub async fn report(store: &dyn IndexStore, limit: usize) -> PipelineResult<IndexReport> {
    let meta = store.load_meta().await?;
    let count = store.count().await?;
    let sample = if count > 0 {
        store.peek(limit).await?
    } else {
        Vec::new()
    };
    Ok(IndexReport {
        location: store.location(),
        meta,
        count,
        sample,
    })
}
