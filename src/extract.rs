//! Text extraction for input files (plain text, PDF, images).
//!
//! - `.txt` / `.md`: read as UTF-8 (lossy).
//! - `.pdf`: `pdf-extract`, falling back to page-by-page `lopdf` extraction
//!   when the first extractor fails or finds no text.
//! - `.png` `.jpg` `.jpeg` `.bmp` `.tiff`: OCR through the `tesseract` CLI.
//!
//! Extraction never panics. [`extract_file`] turns any failure into empty
//! text plus a warning, so one bad file cannot abort an ingest.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
    Image,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(FileKind::Text),
            "pdf" => Some(FileKind::Pdf),
            e if IMAGE_EXTENSIONS.contains(&e) => Some(FileKind::Image),
            _ => None,
        }
    }
}

/// Extract plain text from `path`.
pub fn extract_text(path: &Path, tesseract_cmd: &str) -> Result<String, ExtractError> {
    let kind = FileKind::from_path(path)
        .ok_or_else(|| ExtractError::Unsupported(path.display().to_string()))?;
    match kind {
        FileKind::Text => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        FileKind::Pdf => {
            let bytes = std::fs::read(path)?;
            extract_pdf(&bytes)
        }
        FileKind::Image => ocr_image(path, tesseract_cmd),
    }
}

/// Like [`extract_text`], but a failure yields empty text and a warning.
pub fn extract_file(path: &Path, tesseract_cmd: &str) -> String {
    match extract_text(path, tesseract_cmd) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                file = %path.display(),
                error = %e,
                "extraction failed; skipping content"
            );
            String::new()
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        Ok(_) => {
            tracing::debug!("pdf-extract found no text; trying lopdf");
            extract_pdf_fallback(bytes)
        }
        Err(primary) => {
            tracing::debug!(error = %primary, "pdf-extract failed; trying lopdf");
            extract_pdf_fallback(bytes).map_err(|fallback| {
                ExtractError::Pdf(format!("{}; fallback: {}", primary, fallback))
            })
        }
    }
}

fn extract_pdf_fallback(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let mut out = String::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(text) => {
                out.push_str(&text);
                out.push('\n');
            }
            Err(e) => tracing::debug!(page, error = %e, "skipping unreadable PDF page"),
        }
    }
    Ok(out)
}

fn ocr_image(path: &Path, tesseract_cmd: &str) -> Result<String, ExtractError> {
    let output = Command::new(tesseract_cmd)
        .arg(path)
        .arg("stdout")
        .output()
        .map_err(|e| ExtractError::Ocr(format!("could not run '{}': {}", tesseract_cmd, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Ocr(format!(
            "'{}' exited with {}: {}",
            tesseract_cmd,
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
