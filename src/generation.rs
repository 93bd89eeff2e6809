//! Generation providers.
//!
//! [`Generator`] implementations selected by `generation.provider`:
//! `disabled`, `ollama` (`POST /api/generate`, non-streaming) and `openai`
//! (`POST /v1/chat/completions`). All failures surface as
//! [`PipelineError::GenerationUnavailable`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use docqa_core::error::{PipelineError, PipelineResult};
use docqa_core::generation::Generator;

use crate::config::GenerationConfig;
use crate::http::{post_json, JsonEndpoint};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

fn unavailable(e: anyhow::Error) -> PipelineError {
    PipelineError::GenerationUnavailable(format!("{:#}", e))
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> PipelineResult<String> {
        Err(PipelineError::GenerationUnavailable(
            "generation provider is disabled; set [generation] provider in the config".to_string(),
        ))
    }
}

/// Completions from a local Ollama instance, e.g. `ollama pull gemma:2b`.
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    timeout_secs: u64,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> PipelineResult<String> {
        let endpoint = JsonEndpoint {
            label: "Ollama",
            url: format!("{}/api/generate", self.url),
            bearer: None,
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        };
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = post_json(&endpoint, &body).await.map_err(unavailable)?;
        parse_ollama_generate(&json).map_err(unavailable)
    }
}

fn parse_ollama_generate(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Ollama error: {}", err);
    }
    json.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

/// Chat completions from the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model,
            api_key,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> PipelineResult<String> {
        let endpoint = JsonEndpoint {
            label: "OpenAI",
            url: OPENAI_CHAT_URL.to_string(),
            bearer: Some(self.api_key.clone()),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
        };
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = post_json(&endpoint, &body).await.map_err(unavailable)?;
        parse_openai_chat(&json).map_err(unavailable)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content")
        })
}

/// Create the [`Generator`] named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
