// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quire Workflows - The durable orchestration core.
//!
//! Five workflows cooperate over the activity surface:
//!
//! | Workflow | Shape |
//! |----------|-------|
//! | Corpus Ingest | fan-out/fan-in over PDFs with bounded child batches |
//! | Paper Process | per-paper linear pipeline with step-level status |
//! | Survey Build | retrieval + LLM drafting with context-reduction retry |
//! | Backfill | mode-dispatched reconciliation writing a versioned manifest |
//! | KG Extraction | per-paper chunk-level triple extraction, deduplicated |
//!
//! All of them share the provider failover engine in [`failover`]: a
//! workflow-local state machine that picks provider indices under classified
//! errors, applies cooldowns and bounded backoff, and honors
//! preferred/strict provider modes.
//!
//! Workflow functions are deterministic: every side effect goes through the
//! engine's checkpointed primitives, every timestamp comes from the workflow
//! clock, and nothing in here reads the environment.

pub mod backfill;
pub mod failover;
pub mod ids;
pub mod ingest;
pub mod kg;
pub mod paper;
pub mod runtime;
pub mod survey;
pub mod types;

pub use backfill::backfill_workflow;
pub use ingest::corpus_ingest_workflow;
pub use kg::{kg_backfill_workflow, kg_extract_paper_workflow};
pub use paper::paper_process_workflow;
pub use runtime::{RuntimeDefaults, WorkflowRuntime};
pub use survey::survey_build_workflow;

/// Query handler names, mirrored by the HTTP façade.
pub const QUERY_GET_PAPER_STATUS: &str = "GetPaperStatus";
pub const QUERY_GET_PROGRESS: &str = "GetProgress";
pub const QUERY_GET_SURVEY_PROGRESS: &str = "GetSurveyProgress";
pub const QUERY_GET_KG_BACKFILL_PROGRESS: &str = "GetKGBackfillProgress";

/// Workflow kind labels recorded on instances.
pub const KIND_CORPUS_INGEST: &str = "corpus_ingest";
pub const KIND_PAPER_PROCESS: &str = "paper_process";
pub const KIND_SURVEY_BUILD: &str = "survey_build";
pub const KIND_BACKFILL: &str = "backfill";
pub const KIND_KG_BACKFILL: &str = "kg_backfill";
pub const KIND_KG_EXTRACT_PAPER: &str = "kg_extract_paper";

/// Chunk version used when the caller omits one.
pub fn default_chunk_version(v: &str) -> String {
    let v = v.trim();
    if v.is_empty() { "v1".to_string() } else { v.to_string() }
}

/// Embedding version used when the caller omits one. This is the retrieval
/// contract default; search filters must use the same value.
pub fn default_embed_version(v: &str) -> String {
    let v = v.trim();
    if v.is_empty() { "v1".to_string() } else { v.to_string() }
}

/// Provider counts are at least one (the registry seeds a mock).
pub fn default_count(n: usize) -> usize {
    n.max(1)
}

/// Seconds with a fallback for zero.
pub fn default_seconds(n: u64, fallback: u64) -> u64 {
    if n == 0 { fallback } else { n }
}
