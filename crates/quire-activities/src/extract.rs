// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PDF text extraction.
//!
//! Extraction is an opaque activity behind [`TextExtractor`]: the production
//! implementation shells out to `pdftotext`, and tests substitute scripted
//! extractors. Empty output after sanitation is the distinguished
//! "no extractable text" failure, which is terminal for the paper (it is
//! deterministic on the input, so no amount of retrying helps).

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Marker the workflows match on for the terminal content error.
pub const NO_EXTRACTABLE_TEXT: &str = "no extractable text found in PDF";

/// Extraction failures.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The document yielded no text at all.
    #[error("{NO_EXTRACTABLE_TEXT}")]
    NoText,

    /// The extractor tool failed or is unavailable.
    #[error("extract pdf text from {path}: {details}")]
    Tool {
        /// The input path.
        path: String,
        /// Error details.
        details: String,
    },
}

/// True when a failure message is the deterministic no-text content error.
pub fn is_no_text_error(message: &str) -> bool {
    message.to_lowercase().contains("no extractable text")
}

/// Opaque text extraction seam.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract raw text from the document at `path`.
    async fn extract(&self, path: &str) -> Result<String, ExtractionError>;
}

/// Production extractor: `pdftotext -enc UTF-8 <file> -`.
#[derive(Debug, Default)]
pub struct PdftotextExtractor;

#[async_trait]
impl TextExtractor for PdftotextExtractor {
    async fn extract(&self, path: &str) -> Result<String, ExtractionError> {
        let output = Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|e| ExtractionError::Tool {
                path: path.to_string(),
                details: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Tool {
                path: path.to_string(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Extractor that reads the file as plain UTF-8 text. Useful for local
/// experimentation with .txt corpora and in integration tests.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &str) -> Result<String, ExtractionError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExtractionError::Tool {
                path: path.to_string(),
                details: e.to_string(),
            })
    }
}
