// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The activity surface trait.
//!
//! Workflows call activities only through this trait, which is what lets
//! workflow tests substitute scripted implementations (failing providers,
//! empty extractions, flaky stores) without a database or network.

use async_trait::async_trait;
use quire_engine::ActivityError;
use serde_json::Value;

use crate::types::*;

/// Every idempotent unit of work the workflows can invoke.
///
/// Failures carry their entire meaning in the error message: provider errors
/// pass through classification-relevant text, and content errors use the
/// distinguished markers the workflows match on.
#[async_trait]
pub trait ActivitySurface: Send + Sync {
    /// Deterministic sorted list of PDF paths in a corpus input directory.
    async fn list_pdfs(&self, input_dir: &str) -> Result<Vec<String>, ActivityError>;

    /// SHA-256 hex of the file bytes; the paper's content-addressed identity.
    async fn compute_paper_id(&self, paper_path: &str) -> Result<String, ActivityError>;

    /// Sanitized UTF-8 text of the PDF, or the distinguished
    /// "no extractable text" failure when nothing remains.
    async fn extract_text(&self, paper_path: &str) -> Result<String, ActivityError>;

    /// Heuristic title/authors from the first non-empty lines.
    async fn extract_metadata(&self, text: &str) -> Result<PaperMetadata, ActivityError>;

    /// Deterministic sliding-window chunking with content-addressed ids.
    async fn chunk_text(&self, input: ChunkTextInput) -> Result<Vec<ChunkItem>, ActivityError>;

    /// Embed a chunk batch via one specific provider index.
    async fn embed_chunks(
        &self,
        input: EmbedChunksInput,
    ) -> Result<EmbedChunksOutput, ActivityError>;

    /// Embed one query text via one specific provider index.
    async fn embed_query(&self, input: EmbedQueryInput)
    -> Result<EmbedQueryOutput, ActivityError>;

    /// Generate text via one specific provider index (or a caller ref).
    async fn llm_generate(
        &self,
        input: LlmGenerateInput,
    ) -> Result<LlmGenerateOutput, ActivityError>;

    /// Upsert chunk rows; vectors only replace stored ones when present.
    async fn upsert_chunks(&self, input: UpsertChunksInput) -> Result<(), ActivityError>;

    /// Upsert the paper row's status/metadata.
    async fn update_paper_status(&self, input: PaperStatusUpdate) -> Result<(), ActivityError>;

    /// Vector search restricted to (corpus, embedding_version).
    async fn search_chunks(
        &self,
        input: SearchChunksInput,
    ) -> Result<Vec<RetrievedChunk>, ActivityError>;

    /// Title/author/year metadata for a set of papers.
    async fn get_survey_paper_meta(
        &self,
        corpus_id: &str,
        paper_ids: &[String],
    ) -> Result<Vec<SurveyPaperMeta>, ActivityError>;

    /// Update a survey run's status/artifact path.
    async fn update_survey_run(&self, input: SurveyRunUpdate) -> Result<(), ActivityError>;

    /// Append one provider-invocation audit row.
    async fn log_llm_call(&self, input: LlmCallLog) -> Result<(), ActivityError>;

    /// Upsert a topic→paper retrieval edge.
    async fn upsert_topic_graph(&self, input: TopicGraphEdge) -> Result<(), ActivityError>;

    /// Papers with status 'failed'.
    async fn list_failed_papers(
        &self,
        corpus_id: &str,
    ) -> Result<Vec<PaperSummary>, ActivityError>;

    /// All papers of a corpus.
    async fn list_corpus_papers(
        &self,
        corpus_id: &str,
    ) -> Result<Vec<PaperSummary>, ActivityError>;

    /// A paper's title and chunks, for KG extraction.
    async fn list_paper_chunks(
        &self,
        corpus_id: &str,
        paper_id: &str,
    ) -> Result<PaperChunks, ActivityError>;

    /// Upsert an extraction batch into the graph tables.
    async fn upsert_kg_triples(&self, input: UpsertKgTriplesInput) -> Result<(), ActivityError>;

    /// Upsert the KG run-state row.
    async fn mark_kg_paper_run(&self, input: KgRunUpdate) -> Result<(), ActivityError>;

    /// Atomically write `corpus_summary.json`.
    async fn write_corpus_summary(
        &self,
        corpus_id: &str,
        summary: Value,
    ) -> Result<(), ActivityError>;

    /// Atomically write the per-paper artifact bundle.
    async fn write_paper_artifacts(&self, input: PaperArtifacts) -> Result<(), ActivityError>;

    /// Atomically write the survey report; returns the artifact path.
    async fn write_survey_report(
        &self,
        input: SurveyReportInput,
    ) -> Result<String, ActivityError>;

    /// Atomically write a backfill run manifest; returns the artifact path.
    async fn write_run_manifest(
        &self,
        corpus_id: &str,
        run_id: &str,
        manifest: Value,
    ) -> Result<String, ActivityError>;
}
