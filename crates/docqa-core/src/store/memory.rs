//! In-memory [`IndexStore`] for tests and embedding in other programs.
//!
//! The index lives in an `Arc` snapshot behind a `RwLock`. `replace` builds
//! the new snapshot off to the side and swaps the pointer, so readers holding
//! the old snapshot finish against it untouched.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Chunk, IndexEntry, IndexMeta, ScoredChunk};

use super::{rank, IndexStore};

struct Snapshot {
    meta: IndexMeta,
    entries: Vec<IndexEntry>,
}

pub struct InMemoryStore {
    name: String,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: RwLock::new(None),
        }
    }

    fn snapshot(&self) -> PipelineResult<Option<Arc<Snapshot>>> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| PipelineError::Persistence(format!("index lock poisoned: {}", e)))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }

    async fn load_meta(&self) -> PipelineResult<Option<IndexMeta>> {
        Ok(self.snapshot()?.map(|s| s.meta.clone()))
    }

    async fn count(&self) -> PipelineResult<u64> {
        Ok(self
            .snapshot()?
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn replace(&self, meta: &IndexMeta, entries: &[IndexEntry]) -> PipelineResult<()> {
        let next = Arc::new(Snapshot {
            meta: meta.clone(),
            entries: entries.to_vec(),
        });
        let mut guard = self
            .current
            .write()
            .map_err(|e| PipelineError::Persistence(format!("index lock poisoned: {}", e)))?;
        *guard = Some(next);
        Ok(())
    }

    async fn vector_search(&self, query: &[f32], k: usize) -> PipelineResult<Vec<ScoredChunk>> {
        let Some(snapshot) = self.snapshot()? else {
            return Ok(Vec::new());
        };
        let entries = snapshot
            .entries
            .iter()
            .map(|e| (e.chunk.clone(), e.vector.clone()));
        Ok(rank(query, entries, k))
    }

    async fn peek(&self, limit: usize) -> PipelineResult<Vec<Chunk>> {
        Ok(self
            .snapshot()?
            .map(|s| s.entries.iter().take(limit).map(|e| e.chunk.clone()).collect())
            .unwrap_or_default())
    }

    async fn source_counts(&self) -> PipelineResult<Vec<(String, u64)>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        if let Some(snapshot) = self.snapshot()? {
            for entry in &snapshot.entries {
                *counts.entry(entry.chunk.source.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chunk, meta};

    fn entry(text: &str, index: i64, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk: chunk("doc.txt", index, text),
            vector,
        }
    }

    fn old_pair() -> Vec<IndexEntry> {
        vec![
            entry("old a", 0, vec![1.0, 0.0]),
            entry("old b", 1, vec![0.0, 1.0]),
        ]
    }

    #[tokio::test]
    async fn test_absent_store() {
        let store = InMemoryStore::default();
        assert!(store.load_meta().await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.vector_search(&[1.0], 3).await.unwrap().is_empty());
        assert!(store.peek(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_index() {
        let store = InMemoryStore::default();
        store.replace(&meta(2), &old_pair()).await.unwrap();
        store
            .replace(&meta(1), &[entry("new", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.vector_search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn test_peek_insertion_order() {
        let store = InMemoryStore::default();
        let entries: Vec<IndexEntry> = (0..5)
            .map(|i| entry(&format!("chunk {}", i), i, vec![1.0]))
            .collect();
        store.replace(&meta(5), &entries).await.unwrap();
        let peeked = store.peek(3).await.unwrap();
        let texts: Vec<&str> = peeked.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["chunk 0", "chunk 1", "chunk 2"]);
    }

    #[tokio::test]
    async fn test_source_counts() {
        let store = InMemoryStore::default();
        assert!(store.source_counts().await.unwrap().is_empty());

        let mut entries = old_pair();
        entries.push(IndexEntry {
            chunk: chunk("a.txt", 0, "other"),
            vector: vec![1.0, 0.0],
        });
        store.replace(&meta(3), &entries).await.unwrap();

        let counts = store.source_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![("a.txt".to_string(), 1), ("doc.txt".to_string(), 2)]
        );
    }
}
