//! # docqa core
//!
//! Runtime-agnostic logic for the docqa question-answering pipeline: data
//! models, the recursive chunker, the embedding and generation collaborator
//! traits, the index store abstraction, retrieval, answer synthesis and the
//! build/query orchestrator.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem I/O. Concrete
//! stores and model clients live in the `docqa` app crate and are injected
//! into [`pipeline::Pipeline`] as trait objects.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod retrieve;
pub mod store;
pub mod synthesize;

#[cfg(test)]
pub(crate) mod test_support;
