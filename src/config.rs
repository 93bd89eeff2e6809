//! TOML configuration.
//!
//! Every section except `[index]` is optional and falls back to the defaults
//! below, which mirror the values the pipeline was tuned with (500-character
//! chunks with 50 characters of overlap, `k = 12`, `gemma:2b` at temperature
//! 0.2 for answers).
//!
//! ```toml
//! [index]
//! dir = "./data/index"
//! collection = "document_embeddings"
//! force_rebuild = true
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docqa_core::chunk::ChunkParams;
use docqa_core::pipeline::{PipelineSettings, DEFAULT_THEME_CONTEXT_CHARS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the index file. Created on first build.
    pub dir: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_force_rebuild")]
    pub force_rebuild: bool,
}

fn default_collection() -> String {
    "document_embeddings".to_string()
}
fn default_force_rebuild() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    500
}
fn default_overlap_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_theme_context_chars")]
    pub theme_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            theme_context_chars: default_theme_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    12
}
fn default_theme_context_chars() -> usize {
    DEFAULT_THEME_CONTEXT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            temperature: default_temperature(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}
fn default_generation_retries() -> u32 {
    2
}
fn default_generation_timeout_secs() -> u64 {
    120
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Directory scanned by `docqa ingest` when no paths are given; uploads land here.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// When set, extracted text is written here as `<filename>.txt`.
    #[serde(default)]
    pub text_dir: Option<PathBuf>,
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            text_dir: None,
            tesseract_cmd: default_tesseract_cmd(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("./data/input")
}
fn default_include_globs() -> Vec<String> {
    [
        "**/*.pdf", "**/*.png", "**/*.jpg", "**/*.jpeg", "**/*.bmp", "**/*.tiff", "**/*.txt",
        "**/*.md",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

impl Config {
    /// Defaults with the index under `./data/index`.
    pub fn minimal() -> Self {
        Self {
            index: IndexConfig {
                dir: PathBuf::from("./data/index"),
                collection: default_collection(),
                force_rebuild: default_force_rebuild(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            ingest: IngestConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Path of the SQLite index file: `<dir>/<collection>.sqlite`.
    pub fn index_path(&self) -> PathBuf {
        self.index
            .dir
            .join(format!("{}.sqlite", self.index.collection))
    }

    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            max_chars: self.chunking.max_chars,
            overlap_chars: self.chunking.overlap_chars,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            collection: self.index.collection.clone(),
            params: self.chunk_params(),
            top_k: self.retrieval.top_k,
            embed_batch_size: self.embedding.batch_size,
            force_rebuild: self.index.force_rebuild,
            theme_context_chars: self.retrieval.theme_context_chars,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.index.collection.trim().is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be smaller than chunking.max_chars");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, openai, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.generation.model.is_none() {
                anyhow::bail!(
                    "generation.model must be specified when provider is '{}'",
                    config.generation.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
