//! Index status and inspection.
//!
//! `docqa status` gives a quick summary of what is indexed (location, size,
//! model, chunk counts per source) and can probe the configured models.
//! `docqa inspect` prints the entry count and the first few chunks, which is
//! the quickest way to confirm that extraction produced sensible text.
//!
//! Both commands read the index file directly; no model client is built
//! unless `status --check` asks for the generation probe.

use anyhow::Result;

use docqa_core::index;
use docqa_core::store::IndexStore;

use crate::config::Config;
use crate::generation::create_generator;
use crate::sqlite_store::SqliteIndexStore;

const PREVIEW_CHARS: usize = 160;

pub async fn run_status(config: &Config, check_models: bool) -> Result<()> {
    let store = SqliteIndexStore::new(config.index_path());
    let report = index::report(&store, 0)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
    let by_source = store
        .source_counts()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;

    let index_path = config.index_path();
    let size = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    println!("docqa status");
    println!("============");
    println!();
    println!("  Index:       {}", report.location);
    println!("  Size:        {}", format_bytes(size));

    match &report.meta {
        Some(meta) if report.count > 0 => {
            println!("  Collection:  {}", meta.collection);
            println!("  Model:       {} ({} dims)", meta.model, meta.dims);
            println!("  Chunks:      {}", report.count);
            println!(
                "  Chunking:    {} chars, {} overlap",
                meta.max_chars, meta.overlap_chars
            );
            println!("  Built:       {}", format_ts_relative(meta.built_at));
        }
        _ => {
            println!("  Chunks:      0 (no documents indexed)");
        }
    }

    if !by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<40} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(49));
        for (source, count) in &by_source {
            println!("  {:<40} {:>8}", source, count);
        }
    }

    println!();
    println!(
        "  Embedding:   {}{}",
        config.embedding.provider,
        config
            .embedding
            .model
            .as_ref()
            .map(|m| format!(" / {}", m))
            .unwrap_or_default()
    );
    println!(
        "  Generation:  {}{}",
        config.generation.provider,
        config
            .generation
            .model
            .as_ref()
            .map(|m| format!(" / {}", m))
            .unwrap_or_default()
    );

    if check_models {
        match create_generator(&config.generation) {
            Ok(generator) => match generator.health_check().await {
                Ok(()) => println!("  Generation check: OK"),
                Err(e) => println!("  Generation check: FAILED ({})", e),
            },
            Err(e) => println!("  Generation check: FAILED ({:#})", e),
        }
    }

    println!();
    Ok(())
}

pub async fn run_inspect(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = SqliteIndexStore::new(config.index_path());
    let report = index::report(&store, limit)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Index: {}", report.location);
    println!("Number of documents in the index: {}", report.count);
    if report.count == 0 {
        println!("No documents indexed yet.");
        return Ok(());
    }

    for (i, chunk) in report.sample.iter().enumerate() {
        println!();
        println!("Sample {} ({} #{}):", i + 1, chunk.source, chunk.chunk_index);
        println!("  {}", preview(&chunk.text));
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
