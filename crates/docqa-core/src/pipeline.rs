//! Pipeline orchestrator.
//!
//! [`Pipeline`] sequences the two flows over one index location:
//!
//! ```text
//! build:  Idle → Loading → Chunking → Indexing → Ready      (or Failed at a step)
//! query:  Idle → Retrieving → Synthesizing → Answered       (or Failed)
//! ```
//!
//! The embedder, generator and store are injected as trait objects. Both
//! flows take `&mut self`, so one pipeline never runs a build and a query at
//! the same time; callers that share a pipeline across tasks wrap it in a
//! mutex. Every query opens the persisted index afresh, so a rebuild made by
//! another process is picked up on the next question.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::chunk::{chunk_documents, ChunkParams};
use crate::embedding::Embedder;
use crate::error::{PipelineError, PipelineResult};
use crate::generation::Generator;
use crate::index::{self, BuildSpec};
use crate::models::{Chunk, Document, Exchange, IndexMeta, ScoredChunk};
use crate::progress::{BuildEvent, BuildProgress, NoProgress};
use crate::retrieve::retrieve;
use crate::store::IndexStore;
use crate::synthesize::{summarize_theme, synthesize};

/// Characters of indexed text fed to the theme summarizer.
pub const DEFAULT_THEME_CONTEXT_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub collection: String,
    pub params: ChunkParams,
    pub top_k: usize,
    pub embed_batch_size: usize,
    /// When false, a build reuses an existing non-empty index instead of
    /// re-embedding.
    pub force_rebuild: bool,
    pub theme_context_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            collection: "document_embeddings".to_string(),
            params: ChunkParams::default(),
            top_k: 12,
            embed_batch_size: 64,
            force_rebuild: true,
            theme_context_chars: DEFAULT_THEME_CONTEXT_CHARS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    Loading,
    Chunking,
    Indexing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildState {
    Idle,
    Loading,
    Chunking,
    Indexing,
    Ready { chunk_count: u64, reused: bool },
    Failed { step: BuildStep, error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueryState {
    Idle,
    Retrieving,
    Synthesizing,
    Answered,
    Failed { error: String },
}

/// Result of a query flow that did not error.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answered {
        answer: String,
        sources: Vec<ScoredChunk>,
    },
    /// The index is absent or empty; no model was called.
    NoDocuments,
    /// The index exists but retrieval found nothing; the generator was not called.
    NoContext,
}

impl QueryOutcome {
    pub fn message(&self) -> String {
        match self {
            QueryOutcome::Answered { answer, .. } => answer.clone(),
            QueryOutcome::NoDocuments => {
                "No documents indexed yet. Ingest some documents first.".to_string()
            }
            QueryOutcome::NoContext => {
                "No relevant passages were found in the indexed documents.".to_string()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuildReport {
    pub meta: IndexMeta,
    /// Documents loaded for this build; `0` when an existing index was reused.
    pub documents: usize,
    pub reused: bool,
}

/// Snapshot of the persisted index for status and debugging output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexReport {
    pub location: String,
    pub meta: Option<IndexMeta>,
    pub count: u64,
    pub sample: Vec<Chunk>,
}

/// Where the build flow gets its documents from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self, progress: &dyn BuildProgress) -> PipelineResult<Vec<Document>>;
}

#[async_trait]
impl DocumentSource for Vec<Document> {
    async fn load(&self, progress: &dyn BuildProgress) -> PipelineResult<Vec<Document>> {
        let total = self.len() as u64;
        progress.report(BuildEvent::Loaded { n: total, total });
        Ok(self.clone())
    }
}

pub struct Pipeline {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    progress: Arc<dyn BuildProgress>,
    settings: PipelineSettings,
    build_state: BuildState,
    query_state: QueryState,
    session: Vec<Exchange>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            progress: Arc::new(NoProgress),
            settings,
            build_state: BuildState::Idle,
            query_state: QueryState::Idle,
            session: Vec::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn BuildProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn set_force_rebuild(&mut self, force: bool) {
        self.settings.force_rebuild = force;
    }

    pub fn build_state(&self) -> &BuildState {
        &self.build_state
    }

    pub fn query_state(&self) -> &QueryState {
        &self.query_state
    }

    pub fn history(&self) -> &[Exchange] {
        &self.session
    }

    pub fn clear_history(&mut self) {
        self.session.clear();
    }

    /// Run the build flow: load, chunk, embed and atomically replace the index.
    ///
    /// With `force_rebuild` off, an existing non-empty index is reused and
    /// nothing is loaded. On failure the state records the failing step and
    /// the previously persisted index stays readable.
    pub async fn build(&mut self, source: &dyn DocumentSource) -> PipelineResult<BuildReport> {
        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        let progress = Arc::clone(&self.progress);

        if !self.settings.force_rebuild {
            let existing = index::open(store.as_ref()).await;
            match existing {
                Ok(Some(meta)) => {
                    tracing::info!(
                        location = %store.location(),
                        chunks = meta.chunk_count,
                        "reusing existing index"
                    );
                    self.build_state = BuildState::Ready {
                        chunk_count: meta.chunk_count,
                        reused: true,
                    };
                    return Ok(BuildReport {
                        meta,
                        documents: 0,
                        reused: true,
                    });
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail_build(BuildStep::Loading, e)),
            }
        }

        self.build_state = BuildState::Loading;
        progress.report(BuildEvent::Loading);
        let loaded = source.load(progress.as_ref()).await;
        let documents = match loaded {
            Ok(docs) => docs,
            Err(e) => return Err(self.fail_build(BuildStep::Loading, e)),
        };

        self.build_state = BuildState::Chunking;
        let chunks = match chunk_documents(&documents, self.settings.params) {
            Ok(chunks) => chunks,
            Err(e) => return Err(self.fail_build(BuildStep::Chunking, e)),
        };
        progress.report(BuildEvent::Chunked {
            documents: documents.len() as u64,
            chunks: chunks.len() as u64,
        });
        tracing::info!(documents = documents.len(), chunks = chunks.len(), "chunked documents");

        self.build_state = BuildState::Indexing;
        let spec = BuildSpec {
            collection: self.settings.collection.clone(),
            params: self.settings.params,
            batch_size: self.settings.embed_batch_size,
        };
        let rebuilt =
            index::rebuild(store.as_ref(), embedder.as_ref(), chunks, &spec, progress.as_ref())
                .await;
        let meta = match rebuilt {
            Ok(meta) => meta,
            Err(e) => return Err(self.fail_build(BuildStep::Indexing, e)),
        };

        self.build_state = BuildState::Ready {
            chunk_count: meta.chunk_count,
            reused: false,
        };
        Ok(BuildReport {
            meta,
            documents: documents.len(),
            reused: false,
        })
    }

    /// Run the query flow with the configured `top_k`.
    pub async fn ask(&mut self, question: &str) -> PipelineResult<QueryOutcome> {
        let k = self.settings.top_k;
        self.ask_with_k(question, k).await
    }

    /// Run the query flow: retrieve `k` chunks and synthesize an answer.
    ///
    /// An absent or empty index short-circuits to
    /// [`QueryOutcome::NoDocuments`] without calling either model. Answered
    /// questions are appended to the session history.
    pub async fn ask_with_k(&mut self, question: &str, k: usize) -> PipelineResult<QueryOutcome> {
        let store = Arc::clone(&self.store);
        let embedder = Arc::clone(&self.embedder);
        let generator = Arc::clone(&self.generator);

        self.query_state = QueryState::Retrieving;
        let opened = index::open(store.as_ref()).await;
        let meta = match opened {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                tracing::info!(location = %store.location(), "query against empty index");
                self.query_state = QueryState::Answered;
                return Ok(QueryOutcome::NoDocuments);
            }
            Err(e) => return Err(self.fail_query(e)),
        };

        let retrieved = retrieve(
            store.as_ref(),
            embedder.as_ref(),
            Some(&meta),
            question,
            k,
        )
        .await;
        let hits = match retrieved {
            Ok(hits) => hits,
            Err(e) => return Err(self.fail_query(e)),
        };
        if hits.is_empty() {
            self.query_state = QueryState::Answered;
            return Ok(QueryOutcome::NoContext);
        }

        self.query_state = QueryState::Synthesizing;
        let synthesized = synthesize(generator.as_ref(), question, &hits).await;
        let answer = match synthesized {
            Ok(answer) => answer,
            Err(e) => return Err(self.fail_query(e)),
        };

        self.query_state = QueryState::Answered;
        self.session.push(Exchange {
            question: question.to_string(),
            answer: answer.clone(),
            asked_at: chrono::Utc::now().timestamp(),
        });
        tracing::info!(chunks = hits.len(), "answered question");

        Ok(QueryOutcome::Answered {
            answer,
            sources: hits,
        })
    }

    /// Summarize the main theme of the indexed documents.
    ///
    /// # Errors
    ///
    /// [`PipelineError::IndexAbsent`] when nothing is indexed.
    pub async fn summarize(&self) -> PipelineResult<String> {
        if index::open(self.store.as_ref()).await?.is_none() {
            return Err(PipelineError::IndexAbsent);
        }

        let chunks = self.store.peek(usize::MAX).await?;
        let mut text = String::new();
        for chunk in &chunks {
            if !text.is_empty()
                && text.chars().count() + chunk.text.chars().count()
                    > self.settings.theme_context_chars
            {
                break;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&chunk.text);
        }

        summarize_theme(self.generator.as_ref(), &text).await
    }

    /// Count and sample the persisted index.
    pub async fn inspect(&self, limit: usize) -> PipelineResult<IndexReport> {
        index::report(self.store.as_ref(), limit).await
    }

    /// Probe the generation model.
    pub async fn check_generation(&self) -> PipelineResult<()> {
        self.generator.health_check().await
    }

    fn fail_build(&mut self, step: BuildStep, err: PipelineError) -> PipelineError {
        tracing::warn!(?step, error = %err, "build failed");
        self.build_state = BuildState::Failed {
            step,
            error: err.to_string(),
        };
        err
    }

    fn fail_query(&mut self, err: PipelineError) -> PipelineError {
        tracing::warn!(error = %err, "query failed");
        self.query_state = QueryState::Failed {
            error: err.to_string(),
        };
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::test_support::{
        FailingEmbedder, KeywordEmbedder, RecordingGenerator, UnavailableGenerator,
    };

    struct BrokenSource;

    #[async_trait]
    impl DocumentSource for BrokenSource {
        async fn load(&self, _progress: &dyn BuildProgress) -> PipelineResult<Vec<Document>> {
            Err(PipelineError::Persistence("input directory unreadable".to_string()))
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        embedder: Arc<KeywordEmbedder>,
        generator: Arc<RecordingGenerator>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::default()),
                embedder: Arc::new(KeywordEmbedder::new(&["rust", "python", "docker"])),
                generator: Arc::new(RecordingGenerator::new("Rust.")),
            }
        }

        fn pipeline(&self, settings: PipelineSettings) -> Pipeline {
            Pipeline::new(
                self.store.clone(),
                self.embedder.clone(),
                self.generator.clone(),
                settings,
            )
        }
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("alpha.txt", "Alpha is written in rust with cargo."),
            Document::new("beta.txt", "Beta uses python and pytorch."),
            Document::new("gamma.txt", "Gamma ships with docker images."),
        ]
    }

    #[tokio::test]
    async fn test_build_then_ask() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());

        let report = pipeline.build(&docs()).await.unwrap();
        assert_eq!(report.documents, 3);
        assert_eq!(report.meta.chunk_count, 3);
        assert!(!report.reused);
        assert_eq!(
            pipeline.build_state(),
            &BuildState::Ready {
                chunk_count: 3,
                reused: false
            }
        );

        let outcome = pipeline.ask_with_k("Which project uses rust?", 1).await.unwrap();
        match outcome {
            QueryOutcome::Answered { answer, sources } => {
                assert_eq!(answer, "Rust.");
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].chunk.source, "alpha.txt");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(pipeline.query_state(), &QueryState::Answered);
        assert_eq!(pipeline.history().len(), 1);
        assert_eq!(pipeline.history()[0].question, "Which project uses rust?");
        assert!(fx.generator.prompts()[0].contains("cargo"));
    }

    #[tokio::test]
    async fn test_zero_documents_fails_without_touching_store() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());

        let err = pipeline.build(&Vec::<Document>::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::EmptyInput));
        assert!(matches!(
            pipeline.build_state(),
            BuildState::Failed {
                step: BuildStep::Chunking,
                ..
            }
        ));
        assert!(fx.store.load_meta().await.unwrap().is_none());
        assert_eq!(fx.embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_query_without_index_short_circuits() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());

        let outcome = pipeline.ask("anything?").await.unwrap();

        assert_eq!(outcome, QueryOutcome::NoDocuments);
        assert!(outcome.message().to_lowercase().contains("no documents indexed"));
        assert!(fx.generator.prompts().is_empty());
        assert_eq!(fx.embedder.calls(), 0);
        assert!(pipeline.history().is_empty());
    }

    #[tokio::test]
    async fn test_loading_failure_records_step() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());
        let err = pipeline.build(&BrokenSource).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(matches!(
            pipeline.build_state(),
            BuildState::Failed {
                step: BuildStep::Loading,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_indexing_failure_keeps_previous_index() {
        let fx = Fixture::new();
        fx.pipeline(PipelineSettings::default())
            .build(&docs())
            .await
            .unwrap();

        let mut broken = Pipeline::new(
            fx.store.clone(),
            Arc::new(FailingEmbedder),
            fx.generator.clone(),
            PipelineSettings::default(),
        );
        let err = broken
            .build(&vec![Document::new("new.txt", "replacement")])
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
        assert!(matches!(
            broken.build_state(),
            BuildState::Failed {
                step: BuildStep::Indexing,
                ..
            }
        ));
        assert_eq!(fx.store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reuse_existing_index_when_not_forced() {
        let fx = Fixture::new();
        fx.pipeline(PipelineSettings::default())
            .build(&docs())
            .await
            .unwrap();
        let calls_after_first = fx.embedder.calls();

        let mut pipeline = fx.pipeline(PipelineSettings {
            force_rebuild: false,
            ..PipelineSettings::default()
        });
        let report = pipeline
            .build(&vec![Document::new("other.txt", "something else")])
            .await
            .unwrap();

        assert!(report.reused);
        assert_eq!(report.meta.chunk_count, 3);
        assert_eq!(fx.embedder.calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_generation_unavailable_fails_query() {
        let fx = Fixture::new();
        fx.pipeline(PipelineSettings::default())
            .build(&docs())
            .await
            .unwrap();

        let mut pipeline = Pipeline::new(
            fx.store.clone(),
            fx.embedder.clone(),
            Arc::new(UnavailableGenerator),
            PipelineSettings::default(),
        );
        let err = pipeline.ask("rust?").await.unwrap_err();

        assert!(matches!(err, PipelineError::GenerationUnavailable(_)));
        assert!(matches!(pipeline.query_state(), QueryState::Failed { .. }));
        assert!(pipeline.history().is_empty());
    }

    #[tokio::test]
    async fn test_clear_history() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());
        pipeline.build(&docs()).await.unwrap();
        pipeline.ask("rust?").await.unwrap();
        pipeline.ask("docker?").await.unwrap();
        assert_eq!(pipeline.history().len(), 2);
        pipeline.clear_history();
        assert!(pipeline.history().is_empty());
    }

    #[tokio::test]
    async fn test_summarize_requires_index() {
        let fx = Fixture::new();
        let pipeline = fx.pipeline(PipelineSettings::default());
        let err = pipeline.summarize().await.unwrap_err();
        assert!(matches!(err, PipelineError::IndexAbsent));
    }

    #[tokio::test]
    async fn test_summarize_feeds_indexed_text() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());
        pipeline.build(&docs()).await.unwrap();
        let summary = pipeline.summarize().await.unwrap();
        assert_eq!(summary, "Rust.");
        let prompt = fx.generator.prompts().pop().unwrap();
        assert!(prompt.contains("Alpha is written in rust"));
        assert!(prompt.contains("Gamma ships with docker"));
    }

    #[tokio::test]
    async fn test_inspect_reports_sample() {
        let fx = Fixture::new();
        let mut pipeline = fx.pipeline(PipelineSettings::default());
        let empty = pipeline.inspect(3).await.unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.meta.is_none());

        pipeline.build(&docs()).await.unwrap();
        let report = pipeline.inspect(2).await.unwrap();
        assert_eq!(report.count, 3);
        assert_eq!(report.sample.len(), 2);
        assert_eq!(report.meta.unwrap().model, "keyword-test");
    }
}
