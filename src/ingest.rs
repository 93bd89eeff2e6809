//! `docqa ingest`: extract input files and rebuild the index.
//!
//! Files are discovered by [`connector_fs`], extracted on the blocking pool
//! (PDF parsing and OCR are CPU- and process-bound), optionally mirrored as
//! `<filename>.txt` into `ingest.text_dir`, then handed to
//! [`Pipeline::build`], which chunks, embeds and swaps in the new index.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::task::JoinError;

use docqa_core::chunk::split_text;
use docqa_core::error::{PipelineError, PipelineResult};
use docqa_core::models::Document;
use docqa_core::pipeline::{BuildReport, DocumentSource};
use docqa_core::progress::{BuildEvent, BuildProgress, NoProgress};

use crate::config::Config;
use crate::connector_fs;
use crate::extract;
use crate::progress::ProgressMode;
use crate::runtime;

/// Loads [`Document`]s from files on disk.
pub struct FileLoader {
    files: Vec<PathBuf>,
    tesseract_cmd: String,
    text_dir: Option<PathBuf>,
}

impl FileLoader {
    pub fn new(files: Vec<PathBuf>, config: &Config) -> Self {
        Self {
            files,
            tesseract_cmd: config.ingest.tesseract_cmd.clone(),
            text_dir: config.ingest.text_dir.clone(),
        }
    }

    /// Skip the `<filename>.txt` mirror; used by dry runs.
    pub fn without_text_mirror(mut self) -> Self {
        self.text_dir = None;
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Name a document by its file name, which is also what answers cite.
fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn save_extracted_text(dir: &Path, source: &str, text: &str) {
    let target = dir.join(format!("{}.txt", source));
    let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&target, text));
    if let Err(e) = written {
        tracing::warn!(file = %target.display(), error = %e, "could not save extracted text");
    }
}

/// A crashed extraction task degrades like any other extraction failure.
fn extracted_or_empty(path: &Path, joined: Result<String, JoinError>) -> String {
    joined.unwrap_or_else(|e| {
        tracing::warn!(file = %path.display(), error = %e, "extraction task failed");
        String::new()
    })
}

#[async_trait]
impl DocumentSource for FileLoader {
    async fn load(&self, progress: &dyn BuildProgress) -> PipelineResult<Vec<Document>> {
        let total = self.files.len() as u64;
        let mut documents = Vec::with_capacity(self.files.len());

        for (i, path) in self.files.iter().enumerate() {
            let owned = path.clone();
            let cmd = self.tesseract_cmd.clone();
            let joined =
                tokio::task::spawn_blocking(move || extract::extract_file(&owned, &cmd)).await;
            let text = extracted_or_empty(path, joined);

            let source = source_name(path);
            tracing::debug!(file = %path.display(), chars = text.chars().count(), "extracted");
            if let Some(dir) = &self.text_dir {
                save_extracted_text(dir, &source, &text);
            }

            documents.push(Document::new(source, text));
            progress.report(BuildEvent::Loaded {
                n: i as u64 + 1,
                total,
            });
        }

        Ok(documents)
    }
}

/// Resolve the files to ingest: explicit paths, or `ingest.input_dir`.
pub fn discover(config: &Config, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if paths.is_empty() {
        connector_fs::scan_input_dir(&config.ingest.input_dir, &config.ingest)
    } else {
        connector_fs::collect_inputs(paths, &config.ingest)
    }
}

pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    dry_run: bool,
    force: bool,
    mode: ProgressMode,
) -> Result<()> {
    let files = discover(config, paths)?;

    if dry_run {
        let loader = FileLoader::new(files, config).without_text_mirror();
        let docs = loader.load(&NoProgress).await?;
        let params = config.chunk_params();
        let chunks: usize = docs.iter().map(|d| split_text(&d.text, params).len()).sum();
        println!("ingest (dry-run)");
        println!("  files found: {}", loader.files().len());
        println!("  estimated chunks: {}", chunks);
        return Ok(());
    }

    let loader = FileLoader::new(files, config);
    let mut pipeline = runtime::build_pipeline(config, mode.reporter())?;
    if force {
        pipeline.set_force_rebuild(true);
    }

    match pipeline.build(&loader).await {
        Ok(report) => {
            print_report(config, &report);
            Ok(())
        }
        Err(PipelineError::EmptyInput) => {
            println!(
                "ingest: nothing to index ({} files, no extractable text). Existing index left unchanged.",
                loader.files().len()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "ingest failed");
            anyhow::bail!("{}", e.user_message())
        }
    }
}

fn print_report(config: &Config, report: &BuildReport) {
    if report.reused {
        println!("ingest: reusing existing index (force_rebuild = false)");
    } else {
        println!("ingest ok");
        println!("  documents: {}", report.documents);
    }
    println!("  chunks: {}", report.meta.chunk_count);
    println!("  model: {} ({} dims)", report.meta.model, report.meta.dims);
    println!("  index: {}", config.index_path().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loader_extracts_and_mirrors_text() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.txt"), "alpha text").unwrap();
        std::fs::write(input.join("b.md"), "beta text").unwrap();

        let mut config = Config::minimal();
        config.ingest.input_dir = input.clone();
        config.ingest.text_dir = Some(tmp.path().join("text"));

        let files = discover(&config, &[]).unwrap();
        let loader = FileLoader::new(files, &config);
        let docs = loader.load(&NoProgress).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "a.txt");
        assert_eq!(docs[0].text, "alpha text");
        let mirrored = std::fs::read_to_string(tmp.path().join("text/b.md.txt")).unwrap();
        assert_eq!(mirrored, "beta text");
    }

    #[tokio::test]
    async fn test_unreadable_file_becomes_empty_document() {
        let tmp = TempDir::new().unwrap();
        let pdf = tmp.path().join("broken.pdf");
        std::fs::write(&pdf, b"garbage").unwrap();

        let config = Config::minimal();
        let loader = FileLoader::new(vec![pdf], &config);
        let docs = loader.load(&NoProgress).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "");
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.txt"), "alpha text").unwrap();

        let mut config = Config::minimal();
        config.index.dir = tmp.path().join("index");
        config.ingest.input_dir = input;
        config.ingest.text_dir = Some(tmp.path().join("text"));

        run_ingest(&config, &[], true, false, ProgressMode::Off)
            .await
            .unwrap();

        assert!(!tmp.path().join("text").exists());
        assert!(!config.index_path().exists());
    }

    #[tokio::test]
    async fn test_crashed_extraction_task_becomes_empty_text() {
        let joined =
            tokio::task::spawn_blocking(|| -> String { panic!("extractor crashed") }).await;
        assert!(joined.is_err());
        assert_eq!(extracted_or_empty(Path::new("scan.png"), joined), "");
    }
}
