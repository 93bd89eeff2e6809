//! Top-k semantic retrieval over an opened index.

use crate::embedding::{embed_query, normalize, Embedder};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{IndexMeta, ScoredChunk};
use crate::store::IndexStore;

/// Return at most `k` chunks ordered by descending similarity to `query`.
///
/// `index` is the metadata returned by [`crate::index::open`]; `None` (absent)
/// or an empty index yields an empty result rather than an error, and the
/// embedder is not called.
///
/// # Errors
///
/// [`PipelineError::ModelMismatch`] if the index was built with a different
/// embedding model than `embedder`.
pub async fn retrieve(
    store: &dyn IndexStore,
    embedder: &dyn Embedder,
    index: Option<&IndexMeta>,
    query: &str,
    k: usize,
) -> PipelineResult<Vec<ScoredChunk>> {
    let Some(meta) = index else {
        return Ok(Vec::new());
    };
    if meta.chunk_count == 0 || k == 0 {
        return Ok(Vec::new());
    }
    if meta.model != embedder.model_name() {
        return Err(PipelineError::ModelMismatch {
            indexed: meta.model.clone(),
            query: embedder.model_name().to_string(),
        });
    }

    let mut query_vec = embed_query(embedder, query).await?;
    if query_vec.len() != meta.dims {
        return Err(PipelineError::ModelMismatch {
            indexed: format!("{} ({} dims)", meta.model, meta.dims),
            query: format!("{} ({} dims)", embedder.model_name(), query_vec.len()),
        });
    }
    if query_vec.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::EmbeddingUnavailable(
            "model returned a query vector with non-finite values".to_string(),
        ));
    }
    normalize(&mut query_vec);

    let hits = store.vector_search(&query_vec, k).await?;
    tracing::debug!(k, hits = hits.len(), "retrieved chunks");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkParams;
    use crate::index::{open, rebuild, BuildSpec};
    use crate::progress::NoProgress;
    use crate::store::memory::InMemoryStore;
    use crate::test_support::{chunk, meta, KeywordEmbedder, NonFiniteEmbedder};

    async fn indexed_store(
        embedder: &KeywordEmbedder,
        texts: &[&str],
    ) -> (InMemoryStore, IndexMeta) {
        let store = InMemoryStore::default();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| chunk("doc.txt", i as i64, t))
            .collect();
        let spec = BuildSpec {
            collection: "document_embeddings".to_string(),
            params: ChunkParams::default(),
            batch_size: 4,
        };
        let meta = rebuild(&store, embedder, chunks, &spec, &NoProgress)
            .await
            .unwrap();
        (store, meta)
    }

    #[tokio::test]
    async fn test_top_k_of_ten_descending() {
        let embedder = KeywordEmbedder::new(&["alpha", "beta"]);
        let texts: Vec<String> = (0..10)
            .map(|i| {
                let mut words = vec!["alpha"; i + 1];
                words.extend(vec!["beta"; 10 - i]);
                words.join(" ")
            })
            .collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let (store, meta) = indexed_store(&embedder, &refs).await;

        let hits = retrieve(&store, &embedder, Some(&meta), "alpha", 3)
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(hits[0].chunk.chunk_index, 9);
    }

    #[tokio::test]
    async fn test_absent_index_returns_empty_without_embedding() {
        let embedder = KeywordEmbedder::new(&["alpha"]);
        let store = InMemoryStore::default();
        let hits = retrieve(&store, &embedder, None, "alpha", 3).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let embedder = KeywordEmbedder::new(&["alpha"]);
        let store = InMemoryStore::default();
        let hits = retrieve(&store, &embedder, Some(&meta(0)), "alpha", 3)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_model_mismatch_is_error() {
        let embedder = KeywordEmbedder::new(&["alpha", "beta"]);
        let (store, mut meta) = indexed_store(&embedder, &["alpha"]).await;
        meta.model = "bge-small-en-v1.5".to_string();
        let err = retrieve(&store, &embedder, Some(&meta), "alpha", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fewer_chunks_than_k() {
        let embedder = KeywordEmbedder::new(&["alpha", "beta"]);
        let (store, meta) = indexed_store(&embedder, &["alpha", "beta"]).await;
        assert_eq!(open(&store).await.unwrap(), Some(meta.clone()));
        let hits = retrieve(&store, &embedder, Some(&meta), "beta", 12)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "beta");
    }

    #[tokio::test]
    async fn test_non_finite_query_vector_is_rejected() {
        let embedder = KeywordEmbedder::new(&["alpha", "beta"]);
        let (store, meta) = indexed_store(&embedder, &["alpha", "beta"]).await;
        let err = retrieve(&store, &NonFiniteEmbedder, Some(&meta), "alpha", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
    }
}
