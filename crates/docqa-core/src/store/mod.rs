//! Index storage abstraction.
//!
//! An [`IndexStore`] owns one persisted index location. The whole index is
//! replaced on every build; there are no per-chunk updates. Implementations
//! must make [`IndexStore::replace`] atomic for readers: a concurrent or later
//! reader observes either the previous index or the new one, never a mixture
//! and never a half-written state.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`location`](IndexStore::location) | Human-readable location for logs and status output |
//! | [`load_meta`](IndexStore::load_meta) | Read index metadata; `None` when nothing is persisted |
//! | [`count`](IndexStore::count) | Number of stored entries; `0` when absent |
//! | [`replace`](IndexStore::replace) | Atomically replace the whole index |
//! | [`vector_search`](IndexStore::vector_search) | Top-k entries by dot product |
//! | [`peek`](IndexStore::peek) | First entries in insertion order |

pub mod memory;

use async_trait::async_trait;

use crate::embedding::dot;
use crate::error::PipelineResult;
use crate::models::{Chunk, IndexEntry, IndexMeta, ScoredChunk};

#[async_trait]
pub trait IndexStore: Send + Sync {
    fn location(&self) -> String;

    /// Metadata of the persisted index, or `None` if the location holds no index.
    async fn load_meta(&self) -> PipelineResult<Option<IndexMeta>>;

    async fn count(&self) -> PipelineResult<u64>;

    /// Replace the persisted index with `entries`. On error the previous
    /// index must still be readable.
    async fn replace(&self, meta: &IndexMeta, entries: &[IndexEntry]) -> PipelineResult<()>;

    /// Return at most `k` chunks ordered by descending dot product with
    /// `query`, ties in insertion order. An absent index yields no results.
    async fn vector_search(&self, query: &[f32], k: usize) -> PipelineResult<Vec<ScoredChunk>>;

    async fn peek(&self, limit: usize) -> PipelineResult<Vec<Chunk>>;

    /// Entry counts per source, sorted by source name.
    async fn source_counts(&self) -> PipelineResult<Vec<(String, u64)>>;
}

/// Brute-force ranking shared by store implementations.
///
/// `entries` must be in insertion order; the stable sort keeps that order
/// among equal scores. Entries whose score is not finite (a corrupt or
/// malformed vector) are left out.
pub fn rank<I>(query: &[f32], entries: I, k: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (Chunk, Vec<f32>)>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut skipped = 0usize;
    let mut scored: Vec<ScoredChunk> = entries
        .into_iter()
        .filter_map(|(chunk, vector)| {
            let score = dot(query, &vector);
            if score.is_finite() {
                Some(ScoredChunk { score, chunk })
            } else {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        tracing::warn!(skipped, "ignoring index entries with non-finite similarity");
    }
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}
