//! SQLite-backed [`IndexStore`] with stage-then-swap rebuilds.
//!
//! The live index is a single database file. [`IndexStore::replace`] writes a
//! complete new database to a hidden staging file in the same directory,
//! checks that it holds every entry, closes it, and renames it over the live
//! file. Rename within a directory is atomic, so readers (which open the file
//! per operation) see the old index or the new one. Any failure before the
//! rename deletes the staging file and leaves the live index alone.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::error::{PipelineError, PipelineResult};
use docqa_core::models::{Chunk, IndexEntry, IndexMeta, ScoredChunk};
use docqa_core::store::{rank, IndexStore};

use crate::db;
use crate::migrate;

pub struct SqliteIndexStore {
    path: PathBuf,
}

impl SqliteIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_prefix(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "index.sqlite".to_string());
        format!(".{}.staging-", file_name)
    }

    fn index_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn staging_path(&self) -> PathBuf {
        self.index_dir()
            .join(format!("{}{}", self.staging_prefix(), Uuid::new_v4()))
    }

    /// Delete staging files (and their journals) left by writers that died
    /// before the swap.
    fn remove_stale_staging(&self) {
        let prefix = self.staging_prefix();
        let Ok(listing) = std::fs::read_dir(self.index_dir()) else {
            return;
        };
        for entry in listing.flatten() {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                let path = entry.path();
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(file = %path.display(), error = %e, "stale staging file kept");
                } else {
                    tracing::info!(file = %path.display(), "removed stale staging file");
                }
            }
        }
    }

    async fn open_reader(&self) -> PipelineResult<Option<SqlitePool>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let pool = db::connect_readonly(&self.path)
            .await
            .map_err(persistence("open index"))?;
        Ok(Some(pool))
    }
}

fn persistence<E: Display>(context: &'static str) -> impl FnOnce(E) -> PipelineError {
    move |e| PipelineError::Persistence(format!("{}: {}", context, e))
}

fn remove_staging(path: &Path) {
    let _ = std::fs::remove_file(path);
    let mut journal = path.as_os_str().to_owned();
    journal.push("-journal");
    let _ = std::fs::remove_file(PathBuf::from(journal));
}

async fn write_index(
    pool: &SqlitePool,
    meta: &IndexMeta,
    entries: &[IndexEntry],
) -> PipelineResult<()> {
    migrate::create_schema(pool)
        .await
        .map_err(persistence("create index schema"))?;

    let mut tx = pool.begin().await.map_err(persistence("begin transaction"))?;

    for (key, value) in meta_rows(meta) {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(persistence("write index metadata"))?;
    }

    for (position, entry) in entries.iter().enumerate() {
        let blob = vec_to_blob(&entry.vector);
        sqlx::query(
            r#"
            INSERT INTO entries (position, id, source, chunk_index, text, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position as i64)
        .bind(&entry.chunk.id)
        .bind(&entry.chunk.source)
        .bind(entry.chunk.chunk_index)
        .bind(&entry.chunk.text)
        .bind(&entry.chunk.hash)
        .bind(&blob)
        .execute(&mut *tx)
        .await
        .map_err(persistence("write index entry"))?;
    }

    tx.commit().await.map_err(persistence("commit index"))?;

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
        .fetch_one(pool)
        .await
        .map_err(persistence("verify staged index"))?;
    if stored as usize != entries.len() {
        return Err(PipelineError::Persistence(format!(
            "staged index holds {} entries, expected {}",
            stored,
            entries.len()
        )));
    }
    Ok(())
}

fn meta_rows(meta: &IndexMeta) -> Vec<(&'static str, String)> {
    vec![
        ("collection", meta.collection.clone()),
        ("model", meta.model.clone()),
        ("dims", meta.dims.to_string()),
        ("chunk_count", meta.chunk_count.to_string()),
        ("max_chars", meta.max_chars.to_string()),
        ("overlap_chars", meta.overlap_chars.to_string()),
        ("built_at", meta.built_at.to_string()),
    ]
}

fn parse_meta(rows: HashMap<String, String>) -> PipelineResult<IndexMeta> {
    fn field<'a>(rows: &'a HashMap<String, String>, key: &str) -> PipelineResult<&'a str> {
        rows.get(key).map(|v| v.as_str()).ok_or_else(|| {
            PipelineError::Persistence(format!("index metadata is missing '{}'", key))
        })
    }
    fn number<T: std::str::FromStr>(
        rows: &HashMap<String, String>,
        key: &str,
    ) -> PipelineResult<T> {
        field(rows, key)?.parse().map_err(|_| {
            PipelineError::Persistence(format!("index metadata '{}' is not a number", key))
        })
    }

    Ok(IndexMeta {
        collection: field(&rows, "collection")?.to_string(),
        model: field(&rows, "model")?.to_string(),
        dims: number(&rows, "dims")?,
        chunk_count: number(&rows, "chunk_count")?,
        max_chars: number(&rows, "max_chars")?,
        overlap_chars: number(&rows, "overlap_chars")?,
        built_at: number(&rows, "built_at")?,
    })
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    Chunk {
        id: row.get("id"),
        source: row.get("source"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        hash: row.get("hash"),
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn load_meta(&self) -> PipelineResult<Option<IndexMeta>> {
        let Some(pool) = self.open_reader().await? else {
            return Ok(None);
        };
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&pool)
            .await;
        pool.close().await;

        let rows = rows.map_err(persistence("read index metadata"))?;
        let map: HashMap<String, String> = rows
            .iter()
            .map(|r| (r.get::<String, _>("key"), r.get::<String, _>("value")))
            .collect();
        parse_meta(map).map(Some)
    }

    async fn count(&self) -> PipelineResult<u64> {
        let Some(pool) = self.open_reader().await? else {
            return Ok(0);
        };
        let count: Result<i64, sqlx::Error> = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&pool)
            .await;
        pool.close().await;
        Ok(count.map_err(persistence("count index entries"))? as u64)
    }

    async fn replace(&self, meta: &IndexMeta, entries: &[IndexEntry]) -> PipelineResult<()> {
        self.remove_stale_staging();
        let staging = self.staging_path();
        tracing::debug!(
            staging = %staging.display(),
            entries = entries.len(),
            "writing staged index"
        );

        let pool = match db::connect_writable(&staging).await {
            Ok(pool) => pool,
            Err(e) => {
                remove_staging(&staging);
                return Err(persistence("create staging index")(e));
            }
        };
        let written = write_index(&pool, meta, entries).await;
        pool.close().await;

        if let Err(e) = written {
            remove_staging(&staging);
            return Err(e);
        }

        if let Err(e) = std::fs::rename(&staging, &self.path) {
            remove_staging(&staging);
            return Err(persistence("swap in new index")(e));
        }
        tracing::debug!(path = %self.path.display(), "swapped in new index");
        Ok(())
    }

    async fn vector_search(&self, query: &[f32], k: usize) -> PipelineResult<Vec<ScoredChunk>> {
        let Some(pool) = self.open_reader().await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, hash, embedding FROM entries ORDER BY position",
        )
        .fetch_all(&pool)
        .await;
        pool.close().await;

        let rows = rows.map_err(persistence("read index entries"))?;
        let entries = rows.iter().map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            (row_to_chunk(row), blob_to_vec(&blob))
        });
        Ok(rank(query, entries, k))
    }

    async fn peek(&self, limit: usize) -> PipelineResult<Vec<Chunk>> {
        let Some(pool) = self.open_reader().await? else {
            return Ok(Vec::new());
        };
        // SQLite treats a negative LIMIT as "no limit".
        let limit = i64::try_from(limit).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, hash FROM entries ORDER BY position LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&pool)
        .await;
        pool.close().await;

        let rows = rows.map_err(persistence("read index entries"))?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn source_counts(&self) -> PipelineResult<Vec<(String, u64)>> {
        let Some(pool) = self.open_reader().await? else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS chunks FROM entries GROUP BY source ORDER BY source",
        )
        .fetch_all(&pool)
        .await;
        pool.close().await;

        let rows = rows.map_err(persistence("count entries per source"))?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("source"), r.get::<i64, _>("chunks") as u64))
            .collect())
    }
}
