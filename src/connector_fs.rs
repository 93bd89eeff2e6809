use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// Walk `root` and return the files matching the ingest globs, sorted by
/// relative path.
pub fn scan_input_dir(root: &Path, ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Input directory does not exist: {}", root.display());
    }
    if !root.is_dir() {
        bail!("Input path is not a directory: {}", root.display());
    }

    let include_set = build_globset(&ingest.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(ingest.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files: Vec<(String, PathBuf)> = Vec::new();

    let walker = WalkDir::new(root).follow_links(ingest.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        // Globs are matched case-insensitively on the extension ("SCAN.PNG").
        if !include_set.is_match(&rel_str) && !include_set.is_match(rel_str.to_lowercase()) {
            continue;
        }

        files.push((rel_str, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Expand CLI arguments: directories are scanned, files are taken as-is.
pub fn collect_inputs(paths: &[PathBuf], ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            out.extend(scan_input_dir(path, ingest)?);
        } else if path.is_file() {
            out.push(path.clone());
        } else {
            bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(out)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("b.txt"), "b").unwrap();
        std::fs::write(root.join("a.pdf"), "a").unwrap();
        std::fs::write(root.join("sub/c.PNG"), "c").unwrap();
        std::fs::write(root.join("notes.docx"), "skip").unwrap();
        std::fs::write(root.join(".git/config.txt"), "skip").unwrap();

        let files = scan_input_dir(root, &IngestConfig::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.txt", "sub/c.PNG"]);
    }

    #[test]
    fn test_user_excludes() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "k").unwrap();
        std::fs::write(tmp.path().join("draft.txt"), "d").unwrap();
        let ingest = IngestConfig {
            exclude_globs: vec!["**/draft*".to_string()],
            ..IngestConfig::default()
        };
        let files = scan_input_dir(tmp.path(), &ingest).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_input_dir(&tmp.path().join("nope"), &IngestConfig::default()).is_err());
    }

    #[test]
    fn test_collect_inputs_mixes_files_and_dirs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("docs");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("one.md"), "1").unwrap();
        let single = tmp.path().join("two.txt");
        std::fs::write(&single, "2").unwrap();

        let files = collect_inputs(&[dir, single.clone()], &IngestConfig::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1], single);
    }
}
