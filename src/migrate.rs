use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index schema in a fresh (staging) database.
///
/// `index_meta` holds one row per [`IndexMeta`](docqa_core::models::IndexMeta)
/// field; `entries` holds chunks in insertion order with their unit vectors
/// as little-endian `f32` BLOBs.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            position INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source)")
        .execute(pool)
        .await?;

    Ok(())
}
