// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quire Activities - The idempotent activity surface.
//!
//! Activities are the only place where workflows touch the outside world:
//! filesystem, store, and providers. Each activity is idempotent (safe under
//! the engine's at-least-once execution) and has a single failure mode whose
//! message carries its entire meaning.

mod artifacts;
mod extract;
mod surface;
mod text;
pub mod types;

pub use artifacts::{
    ArtifactError, write_json_atomic, write_json_lines_atomic, write_text_atomic,
};
pub use extract::{
    ExtractionError, NO_EXTRACTABLE_TEXT, PdftotextExtractor, PlainTextExtractor, TextExtractor,
    is_no_text_error,
};
pub use surface::ActivitySurface;
pub use text::{chunk_id, chunk_text, heuristic_title_and_authors, sanitize_text, sha256_hex};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use quire_engine::ActivityError;
use quire_providers::{EmbedRequest, GenerateRequest, ProviderRegistry};
use quire_storage::{
    AuditRepo, ChunkRecord, ChunkRepo, GraphRepo, KgRunRecord, KgTripleRow, LlmCallRecord,
    PaperRepo, PaperUpsert, SearchFilters, Searcher, SurveyRepo, to_literal,
};
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use types::*;

/// Configuration for the production activity surface.
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// Root of the artifact tree (`./data/out`).
    pub data_out_root: PathBuf,
    /// Default chunk window size (characters).
    pub chunk_size: usize,
    /// Default chunk overlap (characters).
    pub chunk_overlap: usize,
    /// Declared embedding dimension.
    pub embed_dim: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            data_out_root: PathBuf::from("./data/out"),
            chunk_size: 1200,
            chunk_overlap: 200,
            embed_dim: 1536,
        }
    }
}

/// Production implementation of [`ActivitySurface`].
pub struct Activities {
    cfg: ActivityConfig,
    papers: PaperRepo,
    chunks: ChunkRepo,
    surveys: SurveyRepo,
    audit: AuditRepo,
    graph: GraphRepo,
    searcher: Searcher,
    providers: Arc<ProviderRegistry>,
    extractor: Arc<dyn TextExtractor>,
}

impl Activities {
    /// Wire the activity surface to a pool, registry, and extractor.
    pub fn new(
        cfg: ActivityConfig,
        pool: PgPool,
        providers: Arc<ProviderRegistry>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            cfg,
            papers: PaperRepo::new(pool.clone()),
            chunks: ChunkRepo::new(pool.clone()),
            surveys: SurveyRepo::new(pool.clone()),
            audit: AuditRepo::new(pool.clone()),
            graph: GraphRepo::new(pool.clone()),
            searcher: Searcher::new(pool),
            providers,
            extractor,
        }
    }

    fn corpus_dir(&self, corpus_id: &str) -> PathBuf {
        self.cfg.data_out_root.join(corpus_id)
    }
}

fn act_err(e: impl std::fmt::Display) -> ActivityError {
    ActivityError::new(e.to_string())
}

/// Non-recursive, case-insensitive `.pdf` listing, sorted for determinism.
async fn list_pdf_paths(input_dir: &str) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(input_dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.to_lowercase().ends_with(".pdf") {
            paths.push(entry.path().to_string_lossy().to_string());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Pad with zeros or truncate the tail so the vector matches `dim`.
fn fit_dimension(mut v: Vec<f32>, dim: usize) -> Vec<f32> {
    if dim == 0 {
        return v;
    }
    v.truncate(dim);
    v.resize(dim, 0.0);
    v
}

fn paper_summary(p: quire_storage::Paper) -> PaperSummary {
    PaperSummary {
        paper_id: p.paper_id,
        filename: p.filename,
        status: p.status,
        title: p.title,
        authors: p.authors,
        year: p.year,
        fail_reason: p.fail_reason,
    }
}

#[async_trait]
impl ActivitySurface for Activities {
    async fn list_pdfs(&self, input_dir: &str) -> Result<Vec<String>, ActivityError> {
        list_pdf_paths(input_dir)
            .await
            .map_err(|e| act_err(format!("read input dir {}: {}", input_dir, e)))
    }

    async fn compute_paper_id(&self, paper_path: &str) -> Result<String, ActivityError> {
        let bytes = tokio::fs::read(paper_path)
            .await
            .map_err(|e| act_err(format!("open file for hash {}: {}", paper_path, e)))?;
        Ok(sha256_hex(&bytes))
    }

    async fn extract_text(&self, paper_path: &str) -> Result<String, ActivityError> {
        let raw = self
            .extractor
            .extract(paper_path)
            .await
            .map_err(act_err)?;
        let text = sanitize_text(&raw);
        if text.is_empty() {
            return Err(ActivityError::new(NO_EXTRACTABLE_TEXT));
        }
        Ok(text)
    }

    async fn extract_metadata(&self, text: &str) -> Result<PaperMetadata, ActivityError> {
        let (title, authors) = heuristic_title_and_authors(text);
        Ok(PaperMetadata { title, authors })
    }

    async fn chunk_text(&self, input: ChunkTextInput) -> Result<Vec<ChunkItem>, ActivityError> {
        let size = if input.chunk_size == 0 {
            self.cfg.chunk_size
        } else {
            input.chunk_size
        };
        let overlap = if input.chunk_overlap >= size {
            self.cfg.chunk_overlap
        } else {
            input.chunk_overlap
        };

        let mut items = Vec::new();
        for (idx, part) in chunk_text(&input.text, size, overlap).into_iter().enumerate() {
            let part = sanitize_text(&part);
            if part.is_empty() {
                continue;
            }
            items.push(ChunkItem {
                chunk_id: chunk_id(&input.paper_id, idx, &part, &input.version),
                paper_id: input.paper_id.clone(),
                corpus_id: input.corpus_id.clone(),
                chunk_index: idx,
                text: part,
            });
        }
        debug!(paper_id = %input.paper_id, chunks = items.len(), "chunked paper text");
        Ok(items)
    }

    async fn embed_chunks(
        &self,
        input: EmbedChunksInput,
    ) -> Result<EmbedChunksOutput, ActivityError> {
        let (provider, _) = self.providers.embed_by_index(input.provider_index);
        let inputs: Vec<String> = input.chunks.iter().map(|c| c.text.clone()).collect();
        let (vectors, info) = provider
            .embed(EmbedRequest {
                operation: input.operation,
                inputs,
                dimension: self.cfg.embed_dim,
            })
            .await
            .map_err(act_err)?;
        Ok(EmbedChunksOutput {
            vectors: vectors
                .into_iter()
                .map(|v| fit_dimension(v, self.cfg.embed_dim))
                .collect(),
            provider_name: info.name,
            model: info.model,
        })
    }

    async fn embed_query(
        &self,
        input: EmbedQueryInput,
    ) -> Result<EmbedQueryOutput, ActivityError> {
        let (provider, _) = self.providers.embed_by_index(input.provider_index);
        let (vectors, info) = provider
            .embed(EmbedRequest {
                operation: input.operation,
                inputs: vec![input.text],
                dimension: self.cfg.embed_dim,
            })
            .await
            .map_err(act_err)?;
        let Some(vector) = vectors.into_iter().next() else {
            return Err(ActivityError::new("embedding provider returned empty vectors"));
        };
        Ok(EmbedQueryOutput {
            vector: fit_dimension(vector, self.cfg.embed_dim),
            provider_name: info.name,
            model: info.model,
        })
    }

    async fn llm_generate(
        &self,
        input: LlmGenerateInput,
    ) -> Result<LlmGenerateOutput, ActivityError> {
        let index = if input.provider_ref.is_empty() {
            input.provider_index
        } else {
            self.providers
                .find_llm_index(&input.provider_ref)
                .ok_or_else(|| {
                    act_err(format!(
                        "llm provider ref not configured in worker: {}",
                        input.provider_ref
                    ))
                })?
        };
        let (provider, reference) = self.providers.llm_by_index(index);
        let (response, info) = provider
            .generate(GenerateRequest {
                operation: input.operation,
                prompt: input.prompt,
                context: input.context,
            })
            .await
            .map_err(|e| act_err(format!("llm generate via {} failed: {}", reference.raw, e)))?;
        Ok(LlmGenerateOutput {
            text: response.text,
            provider_name: info.name,
            model: info.model,
        })
    }

    async fn upsert_chunks(&self, input: UpsertChunksInput) -> Result<(), ActivityError> {
        let records: Vec<ChunkRecord> = input
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let embedding = input
                    .vectors
                    .get(i)
                    .filter(|v| !v.is_empty())
                    .map(|v| to_literal(v));
                ChunkRecord {
                    chunk_id: c.chunk_id.clone(),
                    paper_id: c.paper_id.clone(),
                    corpus_id: c.corpus_id.clone(),
                    chunk_index: c.chunk_index as i32,
                    text: sanitize_text(&c.text),
                    embedding_version: input.embedding_version.clone(),
                    embedding,
                }
            })
            .collect();
        self.chunks.upsert_chunks(&records).await.map_err(act_err)
    }

    async fn update_paper_status(&self, input: PaperStatusUpdate) -> Result<(), ActivityError> {
        self.papers
            .upsert_paper(&PaperUpsert {
                paper_id: input.paper_id,
                corpus_id: input.corpus_id,
                filename: input.filename,
                title: input.title,
                authors: input.authors,
                status: input.status,
                fail_reason: input.fail_reason,
                ..Default::default()
            })
            .await
            .map_err(act_err)
    }

    async fn search_chunks(
        &self,
        input: SearchChunksInput,
    ) -> Result<Vec<RetrievedChunk>, ActivityError> {
        let results = self
            .searcher
            .search_chunks(
                &input.corpus_id,
                &input.query_vec,
                input.top_k,
                &SearchFilters {
                    paper_ids: Vec::new(),
                    embedding_version: input.embedding_version,
                },
            )
            .await
            .map_err(act_err)?;
        Ok(results
            .into_iter()
            .map(|r| RetrievedChunk {
                paper_id: r.paper_id,
                title: r.title,
                chunk_id: r.chunk_id,
                snippet: r.snippet,
                score: r.score,
                text: r.chunk_text,
            })
            .collect())
    }

    async fn get_survey_paper_meta(
        &self,
        corpus_id: &str,
        paper_ids: &[String],
    ) -> Result<Vec<SurveyPaperMeta>, ActivityError> {
        let papers = self
            .papers
            .list_papers_by_ids(corpus_id, paper_ids)
            .await
            .map_err(act_err)?;
        Ok(papers
            .into_iter()
            .map(|p| SurveyPaperMeta {
                paper_id: p.paper_id,
                title: p.title,
                authors: p.authors,
                year: p.year,
                filename: p.filename,
            })
            .collect())
    }

    async fn update_survey_run(&self, input: SurveyRunUpdate) -> Result<(), ActivityError> {
        self.surveys
            .update_run_status(&input.survey_run_id, &input.status, &input.out_path)
            .await
            .map_err(act_err)
    }

    async fn log_llm_call(&self, input: LlmCallLog) -> Result<(), ActivityError> {
        self.audit
            .insert(&LlmCallRecord {
                operation: input.operation,
                corpus_id: input.corpus_id,
                paper_id: input.paper_id,
                provider_name: input.provider_name,
                model: input.model,
                request_id: input.request_id,
                status: input.status,
                error_type: input.error_type,
            })
            .await
            .map_err(act_err)
    }

    async fn upsert_topic_graph(&self, input: TopicGraphEdge) -> Result<(), ActivityError> {
        self.graph
            .upsert_topic_retrieval(
                &input.corpus_id,
                &input.topic,
                &input.paper_id,
                &input.title,
                input.score,
                &input.chunk_id,
            )
            .await
            .map_err(act_err)
    }

    async fn list_failed_papers(
        &self,
        corpus_id: &str,
    ) -> Result<Vec<PaperSummary>, ActivityError> {
        let papers = self.papers.list_failed_papers(corpus_id).await.map_err(act_err)?;
        Ok(papers.into_iter().map(paper_summary).collect())
    }

    async fn list_corpus_papers(
        &self,
        corpus_id: &str,
    ) -> Result<Vec<PaperSummary>, ActivityError> {
        let papers = self
            .papers
            .list_papers_by_corpus(corpus_id)
            .await
            .map_err(act_err)?;
        Ok(papers.into_iter().map(paper_summary).collect())
    }

    async fn list_paper_chunks(
        &self,
        corpus_id: &str,
        paper_id: &str,
    ) -> Result<PaperChunks, ActivityError> {
        let paper = self.papers.get_paper(corpus_id, paper_id).await.map_err(act_err)?;
        let chunks = self
            .chunks
            .list_chunks_by_paper(corpus_id, paper_id)
            .await
            .map_err(act_err)?;
        Ok(PaperChunks {
            title: paper.title,
            chunks: chunks
                .into_iter()
                .map(|c| PaperChunk {
                    chunk_id: c.chunk_id,
                    text: c.text,
                })
                .collect(),
        })
    }

    async fn upsert_kg_triples(&self, input: UpsertKgTriplesInput) -> Result<(), ActivityError> {
        let rows: Vec<KgTripleRow> = input
            .triples
            .iter()
            .map(|t| KgTripleRow {
                corpus_id: input.corpus_id.clone(),
                paper_id: input.paper_id.clone(),
                prompt_hash: input.prompt_hash.clone(),
                model_version: input.model_version.clone(),
                source_type: t.source_type.clone(),
                source_name: t.source_name.clone(),
                relation_type: t.relation_type.clone(),
                target_type: t.target_type.clone(),
                target_name: t.target_name.clone(),
                chunk_id: t.chunk_id.clone(),
                evidence: t.evidence.clone(),
                confidence: t.confidence,
            })
            .collect();
        self.graph.upsert_kg_triples(&rows).await.map_err(act_err)
    }

    async fn mark_kg_paper_run(&self, input: KgRunUpdate) -> Result<(), ActivityError> {
        self.graph
            .upsert_kg_run(&KgRunRecord {
                corpus_id: input.corpus_id,
                paper_id: input.paper_id,
                prompt_hash: input.prompt_hash,
                model_version: input.model_version,
                status: input.status,
                triple_count: input.triple_count as i32,
                last_error: input.last_error,
            })
            .await
            .map_err(act_err)
    }

    async fn write_corpus_summary(
        &self,
        corpus_id: &str,
        summary: Value,
    ) -> Result<(), ActivityError> {
        let path = self.corpus_dir(corpus_id).join("corpus_summary.json");
        write_json_atomic(&path, &summary).map_err(act_err)
    }

    async fn write_paper_artifacts(&self, input: PaperArtifacts) -> Result<(), ActivityError> {
        let base = self
            .corpus_dir(&input.corpus_id)
            .join("papers")
            .join(&input.paper_id);
        write_json_atomic(&base.join("metadata.json"), &input.metadata).map_err(act_err)?;
        write_json_lines_atomic(&base.join("chunks.jsonl"), &input.chunks).map_err(act_err)?;
        write_json_atomic(&base.join("processing_log.json"), &input.processing_log)
            .map_err(act_err)
    }

    async fn write_survey_report(
        &self,
        input: SurveyReportInput,
    ) -> Result<String, ActivityError> {
        let ext = if input.output_format.trim().eq_ignore_ascii_case("latex") {
            "tex"
        } else {
            "md"
        };
        let path = self
            .corpus_dir(&input.corpus_id)
            .join("surveys")
            .join(&input.survey_run_id)
            .join(format!("report.{}", ext));
        write_text_atomic(&path, &input.report).map_err(act_err)?;
        Ok(path.to_string_lossy().to_string())
    }

    async fn write_run_manifest(
        &self,
        corpus_id: &str,
        run_id: &str,
        manifest: Value,
    ) -> Result<String, ActivityError> {
        let path = self
            .corpus_dir(corpus_id)
            .join("runs")
            .join(run_id)
            .join("manifest.json");
        write_json_atomic(&path, &manifest).map_err(act_err)?;
        Ok(path.to_string_lossy().to_string())
    }
}
