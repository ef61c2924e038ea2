// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity input/output types.
//!
//! Everything here crosses a checkpoint boundary and therefore must be
//! serde-serializable and stable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Heuristic paper metadata from extracted text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub authors: String,
}

/// Input for the deterministic chunker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkTextInput {
    pub paper_id: String,
    pub corpus_id: String,
    pub text: String,
    /// 0 falls back to the configured default.
    pub chunk_size: usize,
    /// Out-of-range values fall back to the configured default.
    pub chunk_overlap: usize,
    pub version: String,
}

/// One chunk record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkItem {
    pub chunk_id: String,
    pub paper_id: String,
    pub corpus_id: String,
    pub chunk_index: usize,
    pub text: String,
}

/// Input for batch chunk embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedChunksInput {
    pub operation: String,
    pub corpus_id: String,
    pub paper_id: String,
    pub provider_index: usize,
    pub chunks: Vec<ChunkItem>,
}

/// Output of batch chunk embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedChunksOutput {
    pub vectors: Vec<Vec<f32>>,
    pub provider_name: String,
    pub model: String,
}

/// Input for single-query embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedQueryInput {
    pub operation: String,
    pub text: String,
    pub provider_index: usize,
}

/// Output of single-query embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedQueryOutput {
    pub vector: Vec<f32>,
    pub provider_name: String,
    pub model: String,
}

/// Input for LLM generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmGenerateInput {
    pub operation: String,
    pub corpus_id: String,
    pub paper_id: String,
    pub prompt: String,
    pub context: Vec<String>,
    pub provider_index: usize,
    /// Caller-requested provider by opaque ref; overrides the index when set.
    pub provider_ref: String,
}

/// Output of LLM generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmGenerateOutput {
    pub text: String,
    pub provider_name: String,
    pub model: String,
}

/// Input for the chunk upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertChunksInput {
    pub chunks: Vec<ChunkItem>,
    /// One vector per chunk; missing/empty entries leave stored vectors alone.
    pub vectors: Vec<Vec<f32>>,
    pub embedding_version: String,
}

/// Paper status update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperStatusUpdate {
    pub paper_id: String,
    pub corpus_id: String,
    pub filename: String,
    pub title: String,
    pub authors: String,
    pub status: String,
    pub fail_reason: String,
}

/// Input for vector search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchChunksInput {
    pub corpus_id: String,
    pub query_vec: Vec<f32>,
    pub top_k: i64,
    pub embedding_version: String,
}

/// One ranked retrieval result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub paper_id: String,
    pub title: String,
    pub chunk_id: String,
    pub snippet: String,
    pub score: f64,
    pub text: String,
}

/// Paper metadata for survey references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyPaperMeta {
    pub paper_id: String,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub filename: String,
}

/// Survey run status update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyRunUpdate {
    pub survey_run_id: String,
    pub status: String,
    pub out_path: String,
}

/// One audit row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCallLog {
    pub operation: String,
    pub corpus_id: String,
    pub paper_id: String,
    pub provider_name: String,
    pub model: String,
    pub request_id: String,
    /// "ok" | "failed"
    pub status: String,
    pub error_type: String,
}

/// Topic→paper retrieval edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicGraphEdge {
    pub corpus_id: String,
    pub topic: String,
    pub paper_id: String,
    pub title: String,
    pub chunk_id: String,
    pub score: f64,
}

/// Summary of one paper (listing activities).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperSummary {
    pub paper_id: String,
    pub filename: String,
    pub status: String,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub fail_reason: String,
}

/// One chunk as seen by KG extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperChunk {
    pub chunk_id: String,
    pub text: String,
}

/// A paper's title plus its chunks, for KG extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperChunks {
    pub title: String,
    pub chunks: Vec<PaperChunk>,
}

/// One triple record heading into the graph store (stringly typed: the
/// vocabulary was validated at parse time).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KgTripleRecord {
    pub source_type: String,
    pub source_name: String,
    pub relation_type: String,
    pub target_type: String,
    pub target_name: String,
    pub evidence: String,
    pub confidence: f64,
    pub chunk_id: String,
}

/// Input for the KG triple upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertKgTriplesInput {
    pub corpus_id: String,
    pub paper_id: String,
    pub prompt_hash: String,
    pub model_version: String,
    pub triples: Vec<KgTripleRecord>,
}

/// KG run-state update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KgRunUpdate {
    pub corpus_id: String,
    pub paper_id: String,
    pub prompt_hash: String,
    pub model_version: String,
    pub status: String,
    pub triple_count: usize,
    pub last_error: String,
}

/// Per-paper artifact bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperArtifacts {
    pub corpus_id: String,
    pub paper_id: String,
    pub metadata: Value,
    pub chunks: Vec<ChunkItem>,
    pub processing_log: Value,
}

/// Survey report write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyReportInput {
    pub corpus_id: String,
    pub survey_run_id: String,
    pub report: String,
    /// "latex" writes .tex, anything else .md.
    pub output_format: String,
}
