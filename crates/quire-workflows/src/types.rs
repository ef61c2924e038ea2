// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow inputs and query-visible progress structs.
//!
//! Everything here travels through workflow history and query handlers, so
//! it is serde-stable. Maps are `BTreeMap` for deterministic JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Input for the corpus ingest workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusIngestInput {
    pub corpus_id: String,
    pub input_dir: String,
    /// Bounded fan-out; 0 means the default of 3.
    #[serde(default)]
    pub max_concurrent_children: usize,
    /// Number of configured embedding providers.
    #[serde(default)]
    pub embed_providers: usize,
    /// Quota cooldown window; 0 means the default of 900.
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub chunk_version: String,
    #[serde(default)]
    pub embed_version: String,
}

/// Input for the per-paper pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperProcessInput {
    pub corpus_id: String,
    pub paper_path: String,
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub chunk_version: String,
    #[serde(default)]
    pub embed_version: String,
    #[serde(default)]
    pub embed_providers: usize,
    /// Caller-preferred embedding provider; `None` means no preference.
    #[serde(default)]
    pub preferred_embed_provider_index: Option<usize>,
    /// Pin every attempt to the preferred index (re-embed migrations).
    #[serde(default)]
    pub strict_embed_provider: bool,
    #[serde(default)]
    pub cooldown_seconds: u64,
}

/// Input for survey generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyBuildInput {
    pub survey_run_id: String,
    pub corpus_id: String,
    /// Single-topic convenience; merged with `topics`.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    /// "latex" (default) or "markdown".
    #[serde(default)]
    pub output_format: String,
    /// 0 means the default of 14.
    #[serde(default)]
    pub retrieval_top_k: i64,
    #[serde(default)]
    pub embed_providers: usize,
    #[serde(default)]
    pub llm_providers: usize,
    /// Opaque provider refs, index-aligned with the worker's LLM registry.
    #[serde(default)]
    pub llm_provider_refs: Vec<String>,
    #[serde(default)]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub embed_version: String,
}

/// Input for the backfill workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillInput {
    pub corpus_id: String,
    /// RETRY_FAILED_PAPERS | REEMBED_ALL_PAPERS | REGENERATE_SURVEY
    /// (case-insensitive).
    pub mode: String,
    #[serde(default)]
    pub survey_run_id: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    /// Root of the input tree; empty means "./data/in".
    #[serde(default)]
    pub data_in_root: String,
    #[serde(default)]
    pub chunk_version: String,
    #[serde(default)]
    pub embed_version: String,
    #[serde(default)]
    pub embed_providers: usize,
    #[serde(default)]
    pub preferred_embed_provider_index: Option<usize>,
    #[serde(default)]
    pub strict_embed_provider: bool,
    #[serde(default)]
    pub llm_providers: usize,
    #[serde(default)]
    pub llm_provider_refs: Vec<String>,
    #[serde(default)]
    pub cooldown_seconds: u64,
}

/// Input for corpus-scoped KG extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KgBackfillInput {
    pub corpus_id: String,
    #[serde(default)]
    pub prompt_version: String,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub llm_providers: usize,
    #[serde(default)]
    pub llm_provider_refs: Vec<String>,
    #[serde(default)]
    pub cooldown_seconds: u64,
    /// 0 means the default of 4.
    #[serde(default)]
    pub max_concurrent: usize,
}

/// Input for paper-scoped KG extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KgExtractPaperInput {
    pub corpus_id: String,
    pub paper_id: String,
    #[serde(default)]
    pub prompt_version: String,
    #[serde(default)]
    pub model_version: String,
    #[serde(default)]
    pub llm_providers: usize,
    #[serde(default)]
    pub llm_provider_refs: Vec<String>,
    #[serde(default)]
    pub cooldown_seconds: u64,
}

/// Query-visible status of one paper pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperStatus {
    pub paper_id: String,
    pub paper_path: String,
    pub current_step: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fail_reason: String,
    #[serde(default)]
    pub providers_used: Vec<String>,
    pub retry_counts: BTreeMap<String, u32>,
    pub steps: BTreeMap<String, String>,
}

/// Query-visible progress of corpus ingest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusIngestProgress {
    pub corpus_id: String,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub per_paper_status: BTreeMap<String, String>,
    pub child_workflow_ids: BTreeMap<String, String>,
}

/// Query-visible progress of survey generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyProgress {
    pub survey_run_id: String,
    pub corpus_id: String,
    pub total_topics: usize,
    pub done_topics: usize,
    pub topic_status: BTreeMap<String, String>,
}

/// Query-visible progress of corpus-scoped KG extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KgBackfillProgress {
    pub corpus_id: String,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub per_paper_status: BTreeMap<String, String>,
}
