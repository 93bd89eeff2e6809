//! Build progress events.
//!
//! The orchestrator reports what it is doing through a [`BuildProgress`]
//! sink; the app decides whether that becomes stderr text, JSON lines, or
//! nothing.

/// A single progress event emitted during the build flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildEvent {
    /// Documents are being loaded (extraction may take a while).
    Loading,
    /// `n` of `total` documents loaded.
    Loaded { n: u64, total: u64 },
    /// Chunking produced `chunks` chunks from `documents` documents.
    Chunked { documents: u64, chunks: u64 },
    /// `n` of `total` chunks embedded.
    Embedding { n: u64, total: u64 },
    /// The new index replaced the previous one.
    Swapped { chunks: u64 },
}

pub trait BuildProgress: Send + Sync {
    fn report(&self, event: BuildEvent);
}

/// No-op sink.
pub struct NoProgress;

impl BuildProgress for NoProgress {
    fn report(&self, _event: BuildEvent) {}
}
