// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Atomic artifact writers.
//!
//! Every writer creates its temp file *in the destination directory* and
//! renames over the final path, so a consumer never observes a truncated
//! artifact and the rename stays on one filesystem.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Artifact write failures.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Filesystem failure.
    #[error("artifact io for {path}: {details}")]
    Io {
        /// The destination path.
        path: String,
        /// Error details.
        details: String,
    },

    /// Payload could not be encoded.
    #[error("artifact encode for {path}: {details}")]
    Encode {
        /// The destination path.
        path: String,
        /// Error details.
        details: String,
    },
}

fn io_err(path: &Path, err: impl std::fmt::Display) -> ArtifactError {
    ArtifactError::Io {
        path: path.display().to_string(),
        details: err.to_string(),
    }
}

fn ensure_parent(path: &Path) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), ArtifactError> {
    tmp.persist(path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn temp_in_parent(path: &Path) -> Result<NamedTempFile, ArtifactError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(parent).map_err(|e| io_err(path, e))
}

/// Write a value as two-space-indented JSON, atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    ensure_parent(path)?;
    let mut tmp = temp_in_parent(path)?;
    serde_json::to_writer_pretty(&mut tmp, value).map_err(|e| ArtifactError::Encode {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    tmp.write_all(b"\n").map_err(|e| io_err(path, e))?;
    persist(tmp, path)
}

/// Write rows as JSON-lines (one compact object per line), atomically.
pub fn write_json_lines_atomic<T: Serialize>(
    path: &Path,
    rows: &[T],
) -> Result<(), ArtifactError> {
    ensure_parent(path)?;
    let mut tmp = temp_in_parent(path)?;
    for row in rows {
        let line = serde_json::to_string(row).map_err(|e| ArtifactError::Encode {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
        tmp.write_all(line.as_bytes()).map_err(|e| io_err(path, e))?;
        tmp.write_all(b"\n").map_err(|e| io_err(path, e))?;
    }
    persist(tmp, path)
}

/// Write a text file atomically.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), ArtifactError> {
    ensure_parent(path)?;
    let mut tmp = temp_in_parent(path)?;
    tmp.write_all(content.as_bytes()).map_err(|e| io_err(path, e))?;
    persist(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_atomic_is_pretty_and_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/metadata.json");
        write_json_atomic(&path, &json!({"paper_id": "abc", "chunk_count": 3})).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        // Two-space indentation.
        assert!(content.contains("\n  \"paper_id\": \"abc\""));
        assert!(content.ends_with("}\n"));
    }

    #[test]
    fn test_json_lines_one_object_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunks.jsonl");
        write_json_lines_atomic(&path, &[json!({"i": 0}), json!({"i": 1})]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["{\"i\":0}", "{\"i\":1}"]);
    }

    #[test]
    fn test_no_temp_files_remain_beside_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.tex");
        write_text_atomic(&path, "\\documentclass{article}").unwrap();

        let entries: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["report.tex"]);
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        write_json_atomic(&path, &json!({"total": 1})).unwrap();
        write_json_atomic(&path, &json!({"total": 2})).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"total\": 2"));
    }
}
