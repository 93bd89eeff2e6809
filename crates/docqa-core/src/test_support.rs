//! Test doubles for the embedding and generation collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::error::{PipelineError, PipelineResult};
use crate::generation::Generator;
use crate::models::{Chunk, IndexMeta};

pub fn chunk(source: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: format!("{}#{}", source, index),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: String::new(),
    }
}

pub fn meta(chunk_count: u64) -> IndexMeta {
    IndexMeta {
        collection: "document_embeddings".to_string(),
        model: "keyword-test".to_string(),
        dims: 2,
        chunk_count,
        max_chars: 500,
        overlap_chars: 50,
        built_at: 0,
    }
}

/// Embeds text as keyword occurrence counts, one dimension per keyword.
pub struct KeywordEmbedder {
    keywords: Vec<String>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        self.keywords.len()
    }

    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let words: Vec<String> = text
                    .split_whitespace()
                    .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
                    .collect();
                self.keywords
                    .iter()
                    .map(|k| words.iter().filter(|w| *w == k).count() as f32)
                    .collect()
            })
            .collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        Err(PipelineError::EmbeddingUnavailable(
            "connection refused".to_string(),
        ))
    }
}

/// Shares the keyword embedder's name and width but returns NaN components.
pub struct NonFiniteEmbedder;

#[async_trait]
impl Embedder for NonFiniteEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![f32::NAN, 1.0]).collect())
    }
}

/// Returns a fixed answer and records every prompt it receives.
pub struct RecordingGenerator {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn generate(&self, prompt: &str) -> PipelineResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

pub struct UnavailableGenerator;

#[async_trait]
impl Generator for UnavailableGenerator {
    fn model_name(&self) -> &str {
        "unavailable-test"
    }

    async fn generate(&self, _prompt: &str) -> PipelineResult<String> {
        Err(PipelineError::GenerationUnavailable(
            "model not loaded".to_string(),
        ))
    }
}
