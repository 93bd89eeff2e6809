//! Prompt assembly and answer generation.
//!
//! The context block is the retrieved chunk texts in retrieval order, joined
//! by newlines, with no truncation beyond the retriever's `k`.

use crate::error::PipelineResult;
use crate::generation::Generator;
use crate::models::ScoredChunk;

/// Grounded-answer instruction placed ahead of the context and question.
pub const ANSWER_INSTRUCTIONS: &str = "You are an assistant that answers questions using only the documents provided.

From the context below, extract a complete and accurate answer to the question. Quote the documents directly where possible and preserve any lists as lists. If the context does not contain the answer, say that the documents do not mention it. Do not use outside knowledge.";

/// Theme summary instruction. `{text}` is substituted.
pub const THEME_TEMPLATE: &str = "You are an expert summarizer. Read the following document and return a short, clear summary of its main theme.

Document:
{text}

Theme Summary:";

pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Neither input is scanned for placeholders, so document text and the
/// question reach the model verbatim.
pub fn render_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\n\nQuestion:\n{}\n\nAnswer:",
        ANSWER_INSTRUCTIONS, context, question
    )
}

pub fn render_theme_prompt(text: &str) -> String {
    THEME_TEMPLATE.replace("{text}", text)
}

/// Generate an answer to `question` grounded in `chunks`.
///
/// # Errors
///
/// Propagates [`PipelineError::GenerationUnavailable`](crate::error::PipelineError::GenerationUnavailable)
/// from the generator.
pub async fn synthesize(
    generator: &dyn Generator,
    question: &str,
    chunks: &[ScoredChunk],
) -> PipelineResult<String> {
    let context = build_context(chunks);
    let prompt = render_answer_prompt(question, &context);
    let answer = generator.generate(&prompt).await?;
    Ok(answer.trim().to_string())
}

/// Summarize the main theme of `text`.
pub async fn summarize_theme(generator: &dyn Generator, text: &str) -> PipelineResult<String> {
    let answer = generator.generate(&render_theme_prompt(text)).await?;
    Ok(answer.trim().to_string())
}
