//! End-to-end pipeline tests against the SQLite index store, with in-process
//! embedding and generation doubles.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa::sqlite_store::SqliteIndexStore;
use docqa_core::embedding::Embedder;
use docqa_core::error::{PipelineError, PipelineResult};
use docqa_core::generation::Generator;
use docqa_core::models::Document;
use docqa_core::pipeline::{BuildState, BuildStep, Pipeline, PipelineSettings, QueryOutcome};
use docqa_core::store::IndexStore;

/// Counts vocabulary words; one dimension per word.
struct VocabEmbedder {
    vocab: Vec<String>,
    calls: AtomicUsize,
    down: AtomicBool,
}

impl VocabEmbedder {
    fn new(vocab: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            vocab: vocab.iter().map(|w| w.to_string()).collect(),
            calls: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        "vocab-test"
    }

    fn dims(&self) -> usize {
        self.vocab.len()
    }

    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(PipelineError::EmbeddingUnavailable("connection refused".to_string()));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let words: Vec<String> = text
                    .split_whitespace()
                    .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
                    .collect();
                self.vocab
                    .iter()
                    .map(|v| words.iter().filter(|w| *w == v).count() as f32)
                    .collect()
            })
            .collect())
    }
}

struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn model_name(&self) -> &str {
        "counting-test"
    }

    async fn generate(&self, prompt: &str) -> PipelineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("\nanswer from {} prompt chars\n", prompt.chars().count()))
    }
}

const VOCAB: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
];

fn index_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("index").join("document_embeddings.sqlite")
}

fn pipeline(
    tmp: &TempDir,
    embedder: Arc<VocabEmbedder>,
    generator: Arc<CountingGenerator>,
) -> Pipeline {
    let store = Arc::new(SqliteIndexStore::new(index_path(tmp)));
    Pipeline::new(store, embedder, generator, PipelineSettings::default())
}

fn greek_documents() -> Vec<Document> {
    VOCAB
        .iter()
        .enumerate()
        .map(|(i, word)| {
            Document::new(
                format!("doc{}.txt", i),
                format!("This page is about {} and nothing else.", word),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_query_without_ingestion_calls_no_model() {
    let tmp = TempDir::new().unwrap();
    let embedder = VocabEmbedder::new(VOCAB);
    let generator = CountingGenerator::new();
    let mut p = pipeline(&tmp, embedder.clone(), generator.clone());

    let outcome = p.ask("What is alpha?").await.unwrap();

    assert_eq!(outcome, QueryOutcome::NoDocuments);
    assert!(outcome.message().contains("No documents indexed"));
    assert_eq!(generator.calls(), 0);
    assert_eq!(embedder.calls(), 0);
    assert!(p.history().is_empty());
    assert!(!index_path(&tmp).exists());
}

#[tokio::test]
async fn test_top_three_of_ten_in_descending_order() {
    let tmp = TempDir::new().unwrap();
    let generator = CountingGenerator::new();
    let mut p = pipeline(&tmp, VocabEmbedder::new(VOCAB), generator.clone());

    let report = p.build(&greek_documents()).await.unwrap();
    assert_eq!(report.meta.chunk_count, 10);

    let outcome = p
        .ask_with_k("gamma gamma gamma delta delta beta", 3)
        .await
        .unwrap();
    let QueryOutcome::Answered { answer, sources } = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(sources.len(), 3);
    let order: Vec<&str> = sources.iter().map(|s| s.chunk.source.as_str()).collect();
    assert_eq!(order, vec!["doc2.txt", "doc3.txt", "doc1.txt"]);
    for pair in sources.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(answer, answer.trim());
    assert_eq!(generator.calls(), 1);
    assert_eq!(p.history().len(), 1);
}

#[tokio::test]
async fn test_long_document_becomes_three_overlapping_chunks() {
    let tmp = TempDir::new().unwrap();
    let mut p = pipeline(&tmp, VocabEmbedder::new(VOCAB), CountingGenerator::new());

    let words: Vec<String> = (0..200).map(|i| format!("w{:04}", i)).collect();
    let text = format!("{}!", words.join(" "));
    assert_eq!(text.chars().count(), 1200);

    let report = p.build(&vec![Document::new("long.txt", text)]).await.unwrap();
    assert_eq!(report.meta.chunk_count, 3);

    let store = SqliteIndexStore::new(index_path(&tmp));
    let chunks = store.peek(10).await.unwrap();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 500);
        assert!(!chunk.text.trim().is_empty());
    }
    for pair in chunks.windows(2) {
        let (prev, next) = (&pair[0].text, &pair[1].text);
        let shared = (1..=next.len())
            .rev()
            .find(|&n| prev.ends_with(&next[..n]))
            .unwrap_or(0);
        assert!(shared >= 50, "only {} chars of overlap", shared);
    }
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let embedder = VocabEmbedder::new(VOCAB);
    let mut p = pipeline(&tmp, embedder.clone(), CountingGenerator::new());

    p.build(&vec![Document::new("old.txt", "alpha alpha")]).await.unwrap();

    embedder.set_down(true);
    let err = p
        .build(&vec![Document::new("new.txt", "beta beta")])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmbeddingUnavailable(_)));
    assert!(matches!(
        p.build_state(),
        BuildState::Failed {
            step: BuildStep::Indexing,
            ..
        }
    ));

    let store = SqliteIndexStore::new(index_path(&tmp));
    let chunks = store.peek(10).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, "old.txt");

    embedder.set_down(false);
    p.build(&vec![Document::new("new.txt", "beta beta")]).await.unwrap();
    let chunks = store.peek(10).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].source, "new.txt");

    let leftovers: Vec<_> = std::fs::read_dir(index_path(&tmp).parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[tokio::test]
async fn test_zero_documents_fail_without_touching_store() {
    let tmp = TempDir::new().unwrap();
    let mut p = pipeline(&tmp, VocabEmbedder::new(VOCAB), CountingGenerator::new());
    p.build(&greek_documents()).await.unwrap();

    let err = p.build(&Vec::<Document>::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::EmptyInput));
    assert!(matches!(
        p.build_state(),
        BuildState::Failed {
            step: BuildStep::Chunking,
            ..
        }
    ));

    let store = SqliteIndexStore::new(index_path(&tmp));
    assert_eq!(store.count().await.unwrap(), 10);
}

#[tokio::test]
async fn test_index_is_shared_across_pipelines() {
    let tmp = TempDir::new().unwrap();
    let mut writer = pipeline(&tmp, VocabEmbedder::new(VOCAB), CountingGenerator::new());
    writer.build(&greek_documents()).await.unwrap();

    // A second pipeline over the same file, as a separate process would have.
    let generator = CountingGenerator::new();
    let mut reader = pipeline(&tmp, VocabEmbedder::new(VOCAB), generator.clone());
    let outcome = reader.ask("kappa").await.unwrap();
    let QueryOutcome::Answered { sources, .. } = outcome else {
        panic!("expected an answer");
    };
    assert_eq!(sources[0].chunk.source, "doc9.txt");
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_reuse_when_force_rebuild_is_off() {
    let tmp = TempDir::new().unwrap();
    let embedder = VocabEmbedder::new(VOCAB);
    let mut p = pipeline(&tmp, embedder.clone(), CountingGenerator::new());
    p.build(&greek_documents()).await.unwrap();
    let calls_after_first = embedder.calls();

    p.set_force_rebuild(false);
    let report = p
        .build(&vec![Document::new("ignored.txt", "alpha")])
        .await
        .unwrap();
    assert!(report.reused);
    assert_eq!(report.meta.chunk_count, 10);
    assert_eq!(embedder.calls(), calls_after_first);
}

#[tokio::test]
async fn test_summarize_uses_indexed_text() {
    let tmp = TempDir::new().unwrap();
    let generator = CountingGenerator::new();
    let mut p = pipeline(&tmp, VocabEmbedder::new(VOCAB), generator.clone());

    assert!(matches!(p.summarize().await, Err(PipelineError::IndexAbsent)));
    assert_eq!(generator.calls(), 0);

    p.build(&greek_documents()).await.unwrap();
    let summary = p.summarize().await.unwrap();
    assert!(summary.starts_with("answer from"));
    assert_eq!(generator.calls(), 1);
}
