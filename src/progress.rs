//! Build progress reporting.
//!
//! Reports observable progress during `docqa ingest` so users see how many
//! files have been extracted and how many chunks are left to embed. Progress
//! is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use docqa_core::progress::{BuildEvent, BuildProgress, NoProgress};

/// Human-friendly progress on stderr: "ingest  embedding  1,234 / 5,000 chunks".
pub struct StderrProgress;

impl BuildProgress for StderrProgress {
    fn report(&self, event: BuildEvent) {
        let line = match &event {
            BuildEvent::Loading => "ingest  loading documents...\n".to_string(),
            BuildEvent::Loaded { n, total } => format!(
                "ingest  extracting  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            BuildEvent::Chunked { documents, chunks } => format!(
                "ingest  chunked  {} documents into {} chunks\n",
                format_number(*documents),
                format_number(*chunks)
            ),
            BuildEvent::Embedding { n, total } => format!(
                "ingest  embedding  {} / {} chunks\n",
                format_number(*n),
                format_number(*total)
            ),
            BuildEvent::Swapped { chunks } => {
                format!("ingest  index ready  {} chunks\n", format_number(*chunks))
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgress for JsonProgress {
    fn report(&self, event: BuildEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn event_json(event: &BuildEvent) -> serde_json::Value {
    match event {
        BuildEvent::Loading => serde_json::json!({
            "event": "progress",
            "phase": "loading"
        }),
        BuildEvent::Loaded { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "extracting",
            "n": n,
            "total": total
        }),
        BuildEvent::Chunked { documents, chunks } => serde_json::json!({
            "event": "progress",
            "phase": "chunked",
            "documents": documents,
            "chunks": chunks
        }),
        BuildEvent::Embedding { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "embedding",
            "n": n,
            "total": total
        }),
        BuildEvent::Swapped { chunks } => serde_json::json!({
            "event": "progress",
            "phase": "ready",
            "chunks": chunks
        }),
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn BuildProgress> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
