//! Wiring from configuration to a ready [`Pipeline`].

use anyhow::Result;
use std::sync::Arc;

use docqa_core::pipeline::Pipeline;
use docqa_core::progress::BuildProgress;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::sqlite_store::SqliteIndexStore;

/// Build a pipeline over the SQLite index at [`Config::index_path`].
pub fn build_pipeline(config: &Config, progress: Arc<dyn BuildProgress>) -> Result<Pipeline> {
    let store = Arc::new(SqliteIndexStore::new(config.index_path()));
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    tracing::debug!(
        index = %config.index_path().display(),
        embedder = embedder.model_name(),
        generator = generator.model_name(),
        "pipeline ready"
    );

    Ok(
        Pipeline::new(store, embedder, generator, config.pipeline_settings())
            .with_progress(progress),
    )
}
