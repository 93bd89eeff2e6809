//! Generation collaborator trait.

use async_trait::async_trait;

use crate::error::PipelineResult;

/// An external text generation model.
///
/// Implementations return [`PipelineError::GenerationUnavailable`](crate::error::PipelineError::GenerationUnavailable)
/// when the model cannot be reached or initialized.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> PipelineResult<String>;

    /// Probe the model with a trivial prompt.
    async fn health_check(&self) -> PipelineResult<()> {
        self.generate("Hello").await.map(|_| ())
    }
}
