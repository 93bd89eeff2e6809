//! Error taxonomy for the pipeline.
//!
//! Every component returns [`PipelineError`]; the orchestrator records the
//! failing step and hands the error back to the caller, which turns it into a
//! user-facing message with [`PipelineError::user_message`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No documents, or every chunk was empty after trimming.
    #[error("nothing to index: no documents or no non-empty chunks")]
    EmptyInput,

    /// An operation needed an index and none exists at the configured location.
    #[error("no documents indexed")]
    IndexAbsent,

    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("generation model unavailable: {0}")]
    GenerationUnavailable(String),

    /// Reading or writing the persisted index failed. A failed write leaves
    /// the previous index in place.
    #[error("index persistence failed: {0}")]
    Persistence(String),

    #[error("index was built with embedding model '{indexed}' but queries use '{query}'")]
    ModelMismatch { indexed: String, query: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Short machine-readable code used by the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput => "empty_input",
            PipelineError::IndexAbsent => "index_absent",
            PipelineError::EmbeddingUnavailable(_) => "embedding_unavailable",
            PipelineError::GenerationUnavailable(_) => "generation_unavailable",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::ModelMismatch { .. } => "model_mismatch",
            PipelineError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Message suitable for showing to the person asking questions.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::EmptyInput => {
                "Nothing to index: no text could be extracted from the given documents.".to_string()
            }
            PipelineError::IndexAbsent => {
                "No documents indexed yet. Ingest some documents first.".to_string()
            }
            PipelineError::EmbeddingUnavailable(detail) => format!(
                "The embedding model is not reachable, so documents cannot be indexed or searched right now ({}).",
                detail
            ),
            PipelineError::GenerationUnavailable(detail) => format!(
                "The answer model is not reachable, so no answer can be generated right now ({}).",
                detail
            ),
            PipelineError::Persistence(detail) => format!(
                "The document index could not be read or written; any previous index is unchanged ({}).",
                detail
            ),
            PipelineError::ModelMismatch { indexed, query } => format!(
                "The index was built with embedding model '{}' but '{}' is configured. Re-ingest the documents.",
                indexed, query
            ),
            PipelineError::InvalidConfig(detail) => format!("Invalid configuration: {}", detail),
        }
    }
}
