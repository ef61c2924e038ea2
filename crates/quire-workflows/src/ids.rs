// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic workflow id derivation.
//!
//! Ids are the deduplication keys: resubmitting the same logical work
//! derives the same id and lands on the existing instance.

/// Sanitize a fragment for use inside a workflow id: lowercase, with
/// underscores, dots, and slashes mapped to hyphens.
pub fn sanitize_id(s: &str) -> String {
    s.to_lowercase().replace(['_', '.', '/'], "-")
}

/// `ingest-{corpus_id}`
pub fn corpus_ingest_id(corpus_id: &str) -> String {
    format!("ingest-{}", sanitize_id(corpus_id))
}

/// `paper-{corpus_id}-{filename}`
pub fn paper_process_id(corpus_id: &str, filename: &str) -> String {
    format!("paper-{}-{}", sanitize_id(corpus_id), sanitize_id(filename))
}

/// `survey-{run_id}`
pub fn survey_build_id(survey_run_id: &str) -> String {
    format!("survey-{}", sanitize_id(survey_run_id))
}

/// `backfill-{mode}-{corpus_id}-{unix}`
pub fn backfill_id(mode: &str, corpus_id: &str, unix: i64) -> String {
    format!("backfill-{}-{}-{}", sanitize_id(mode), sanitize_id(corpus_id), unix)
}

/// `kg-backfill-{corpus_id}-{unix}`
pub fn kg_backfill_id(corpus_id: &str, unix: i64) -> String {
    format!("kg-backfill-{}-{}", sanitize_id(corpus_id), unix)
}

/// `kg-paper-{corpus_id}-{paper_id}-{unix}`
pub fn kg_extract_paper_id(corpus_id: &str, paper_id: &str, unix: i64) -> String {
    format!(
        "kg-paper-{}-{}-{}",
        sanitize_id(corpus_id),
        sanitize_id(paper_id),
        unix
    )
}

/// Last path component of a file path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
