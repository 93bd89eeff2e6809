//! Recursive character chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters,
//! with adjacent chunks sharing at least `overlap_chars` characters whenever
//! the split pieces are small enough to carry that much context forward.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from [`SEPARATORS`] that occurs in the text
//!    (`"\n\n"`, then `"\n"`, then `" "`, then single characters).
//! 2. Split on it. Pieces that fit are merged greedily into chunks joined by
//!    the separator; when the next piece would overflow, the current chunk is
//!    emitted and only the shortest tail covering `overlap_chars` is kept.
//! 3. Pieces longer than `max_chars` are split again with the remaining,
//!    finer separators.
//! 4. Chunks are trimmed; empty or whitespace-only chunks are dropped.
//!
//! Lengths are counted in `char`s, never bytes, so multi-byte text is never
//! cut inside a code point.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_documents, ChunkParams};
//! use docqa_core::models::Document;
//!
//! let docs = vec![Document::new("a.txt", "Hello world.\n\nSecond paragraph.")];
//! let chunks = chunk_documents(&docs, ChunkParams::default()).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Chunk, Document};

/// Separators in preference order. The empty separator splits into characters.
pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

pub const DEFAULT_MAX_CHARS: usize = 500;
pub const DEFAULT_OVERLAP_CHARS: usize = 50;

/// Chunk size and overlap, both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkParams {
    pub fn new(max_chars: usize, overlap_chars: usize) -> PipelineResult<Self> {
        let params = Self {
            max_chars,
            overlap_chars,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_chars == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk size must be > 0".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

/// Chunk every document, numbering chunks from 0 within each document.
///
/// # Errors
///
/// - [`PipelineError::EmptyInput`] if `documents` is empty or no document
///   yields a non-empty chunk.
/// - [`PipelineError::InvalidConfig`] if `params` is invalid.
pub fn chunk_documents(documents: &[Document], params: ChunkParams) -> PipelineResult<Vec<Chunk>> {
    if documents.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    params.validate()?;

    let mut chunks = Vec::new();
    for doc in documents {
        let pieces = split_text(&doc.text, params);
        tracing::debug!(source = %doc.source, chunks = pieces.len(), "chunked document");
        for (index, text) in pieces.iter().enumerate() {
            chunks.push(make_chunk(&doc.source, index as i64, text));
        }
    }

    if chunks.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(chunks)
}

/// Split a single text into trimmed, non-empty chunk strings.
pub fn split_text(text: &str, params: ChunkParams) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    split_recursive(&normalized, &SEPARATORS, params)
}

fn split_recursive(text: &str, separators: &[&str], params: ChunkParams) -> Vec<String> {
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep));
    let (separator, finer) = match position {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => ("", &separators[separators.len()..]),
    };

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|p| !p.is_empty()).collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in pieces {
        if char_len(piece) <= params.max_chars {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, separator, params));
            fitting.clear();
        }
        if finer.is_empty() {
            out.extend(split_recursive(piece, &[""], params));
        } else {
            out.extend(split_recursive(piece, finer, params));
        }
    }

    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, separator, params));
    }
    out
}

/// Greedily join pieces (each `<= max_chars`) into chunks with overlap.
fn merge_pieces(pieces: &[&str], separator: &str, params: ChunkParams) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut merged = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);

        if !window.is_empty() && total + sep_len + len > params.max_chars {
            push_joined(&window, separator, &mut merged);

            // Keep the shortest tail that still covers the overlap and leaves room for `piece`.
            while let Some(&(_, first_len)) = window.front() {
                let rest = if window.len() > 1 {
                    total - first_len - sep_len
                } else {
                    0
                };
                let fits = total + sep_len + len <= params.max_chars;
                if fits && rest < params.overlap_chars {
                    break;
                }
                window.pop_front();
                total = rest;
            }
        }

        if !window.is_empty() {
            total += sep_len;
        }
        total += len;
        window.push_back((piece, len));
    }

    if !window.is_empty() {
        push_joined(&window, separator, &mut merged);
    }
    merged
}

fn push_joined(window: &VecDeque<(&str, usize)>, separator: &str, out: &mut Vec<String>) {
    let joined = window
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
