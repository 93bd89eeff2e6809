//! # docqa
//!
//! Local document question answering. Files (PDFs, scanned images, text)
//! are extracted, split into overlapping chunks, embedded and stored in a
//! single-file SQLite index; questions are answered by retrieving the most
//! similar chunks and asking a generation model to answer from them alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Extract    │──▶│  Chunk+Embed  │──▶│  SQLite   │
//! │ PDF/OCR/txt │   │  (docqa-core) │   │  index    │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │ (docqa)  │        │  server  │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest ./data/input        # extract, chunk, embed, swap in the index
//! docqa ask "What is the notice period?"
//! docqa chat                       # interactive session with history
//! docqa serve                      # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction (text, PDF, OCR) |
//! | [`connector_fs`] | Input directory scanning |
//! | [`ingest`] | Build flow entrypoint |
//! | [`ask`] | Query flow entrypoints |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`sqlite_store`] | SQLite index store |
//! | [`server`] | HTTP server |
//!
//! The pipeline itself (chunking, retrieval, answer synthesis and the
//! orchestrator state machine) lives in the `docqa-core` crate.

pub mod ask;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod runtime;
pub mod server;
pub mod sqlite_store;
pub mod stats;
