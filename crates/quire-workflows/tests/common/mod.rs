// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scripted activity surface for workflow tests.
//!
//! The mock plays the role the real activity surface plays, entirely in
//! memory: texts and papers are configured up front, provider calls can be
//! scripted to fail with classification-relevant messages, and every
//! invocation is recorded for assertions.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use quire_activities::types::*;
use quire_activities::{ActivitySurface, NO_EXTRACTABLE_TEXT, heuristic_title_and_authors};
use quire_engine::{ActivityError, ManualClock, MemoryPersistence, WorkflowHost};

pub const DEFAULT_TEXT: &str = "A Study of Things\nA. Researcher\n\nBody text with enough words to chunk.";

#[derive(Default)]
pub struct MockSurface {
    // Configuration
    pub pdfs: Mutex<Vec<String>>,
    pub texts: Mutex<HashMap<String, String>>,
    pub no_text_paths: Mutex<HashSet<String>>,
    pub embed_script: Mutex<VecDeque<Result<EmbedChunksOutput, String>>>,
    pub embed_fail_paper_ids: Mutex<HashSet<String>>,
    pub generate_script: Mutex<VecDeque<Result<LlmGenerateOutput, String>>>,
    /// Persistent failure: the same message every attempt, like a store
    /// rejecting the same bad data.
    pub upsert_chunks_error: Mutex<Option<String>>,
    pub search_results: Mutex<Vec<RetrievedChunk>>,
    pub papers: Mutex<Vec<PaperSummary>>,
    pub paper_chunks: Mutex<PaperChunks>,
    pub extract_delay_ms: Option<u64>,

    // Recordings
    pub compute_calls: AtomicU32,
    pub embed_calls: Mutex<Vec<EmbedChunksInput>>,
    pub embed_query_calls: Mutex<Vec<EmbedQueryInput>>,
    pub generate_calls: Mutex<Vec<LlmGenerateInput>>,
    pub audit_rows: Mutex<Vec<LlmCallLog>>,
    pub status_updates: Mutex<Vec<PaperStatusUpdate>>,
    pub survey_updates: Mutex<Vec<SurveyRunUpdate>>,
    pub kg_runs: Mutex<Vec<KgRunUpdate>>,
    pub kg_upserts: Mutex<Vec<UpsertKgTriplesInput>>,
    pub chunk_upserts: Mutex<Vec<UpsertChunksInput>>,
    pub summaries: Mutex<Vec<Value>>,
    pub paper_artifacts: Mutex<Vec<PaperArtifacts>>,
    pub manifests: Mutex<Vec<(String, Value)>>,
    pub reports: Mutex<Vec<SurveyReportInput>>,
    pub topic_edges: Mutex<Vec<TopicGraphEdge>>,

    // Concurrency gauge over extract_text
    inflight: AtomicUsize,
    pub max_inflight: AtomicUsize,
}

impl MockSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose extraction takes real time, so the concurrency gauge can
    /// observe overlapping children.
    pub fn with_extract_delay(ms: u64) -> Self {
        Self {
            extract_delay_ms: Some(ms),
            ..Self::default()
        }
    }

    pub fn audit_error_types(&self) -> Vec<String> {
        self.audit_rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                if r.status == "ok" {
                    "ok".to_string()
                } else {
                    r.error_type.clone()
                }
            })
            .collect()
    }

    pub fn final_paper_status(&self) -> Option<PaperStatusUpdate> {
        self.status_updates.lock().unwrap().last().cloned()
    }

    fn mock_vectors(&self, n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![0.1 * (i as f32 + 1.0); 8]).collect()
    }
}

fn fail(message: &str) -> ActivityError {
    ActivityError::new(message)
}

#[async_trait]
impl ActivitySurface for MockSurface {
    async fn list_pdfs(&self, _input_dir: &str) -> Result<Vec<String>, ActivityError> {
        let mut paths = self.pdfs.lock().unwrap().clone();
        paths.sort();
        Ok(paths)
    }

    async fn compute_paper_id(&self, paper_path: &str) -> Result<String, ActivityError> {
        self.compute_calls.fetch_add(1, Ordering::SeqCst);
        let filename = paper_path.rsplit('/').next().unwrap_or(paper_path);
        Ok(format!("id-{}", filename))
    }

    async fn extract_text(&self, paper_path: &str) -> Result<String, ActivityError> {
        let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.extract_delay_ms {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        if self.no_text_paths.lock().unwrap().contains(paper_path) {
            return Err(fail(NO_EXTRACTABLE_TEXT));
        }
        let texts = self.texts.lock().unwrap();
        Ok(texts
            .get(paper_path)
            .cloned()
            .unwrap_or_else(|| DEFAULT_TEXT.to_string()))
    }

    async fn extract_metadata(&self, text: &str) -> Result<PaperMetadata, ActivityError> {
        let (title, authors) = heuristic_title_and_authors(text);
        Ok(PaperMetadata { title, authors })
    }

    async fn chunk_text(&self, input: ChunkTextInput) -> Result<Vec<ChunkItem>, ActivityError> {
        let size = if input.chunk_size == 0 { 40 } else { input.chunk_size };
        let overlap = if input.chunk_overlap >= size { 0 } else { input.chunk_overlap };
        let mut items = Vec::new();
        for (idx, part) in quire_activities::chunk_text(&input.text, size, overlap)
            .into_iter()
            .enumerate()
        {
            items.push(ChunkItem {
                chunk_id: quire_activities::chunk_id(&input.paper_id, idx, &part, &input.version),
                paper_id: input.paper_id.clone(),
                corpus_id: input.corpus_id.clone(),
                chunk_index: idx,
                text: part,
            });
        }
        Ok(items)
    }

    async fn embed_chunks(
        &self,
        input: EmbedChunksInput,
    ) -> Result<EmbedChunksOutput, ActivityError> {
        self.embed_calls.lock().unwrap().push(input.clone());
        if self
            .embed_fail_paper_ids
            .lock()
            .unwrap()
            .contains(&input.paper_id)
        {
            return Err(fail("bad request"));
        }
        if let Some(scripted) = self.embed_script.lock().unwrap().pop_front() {
            return scripted.map_err(|m| fail(&m));
        }
        Ok(EmbedChunksOutput {
            vectors: self.mock_vectors(input.chunks.len()),
            provider_name: "mock".to_string(),
            model: "mock-embed-8".to_string(),
        })
    }

    async fn embed_query(
        &self,
        input: EmbedQueryInput,
    ) -> Result<EmbedQueryOutput, ActivityError> {
        self.embed_query_calls.lock().unwrap().push(input);
        Ok(EmbedQueryOutput {
            vector: vec![0.5; 8],
            provider_name: "mock".to_string(),
            model: "mock-embed-8".to_string(),
        })
    }

    async fn llm_generate(
        &self,
        input: LlmGenerateInput,
    ) -> Result<LlmGenerateOutput, ActivityError> {
        self.generate_calls.lock().unwrap().push(input);
        if let Some(scripted) = self.generate_script.lock().unwrap().pop_front() {
            return scripted.map_err(|m| fail(&m));
        }
        Ok(LlmGenerateOutput {
            text: "\\section{Related Work}\nSynthesized findings [ref1].".to_string(),
            provider_name: "mock".to_string(),
            model: "mock-llm-v1".to_string(),
        })
    }

    async fn upsert_chunks(&self, input: UpsertChunksInput) -> Result<(), ActivityError> {
        if let Some(message) = self.upsert_chunks_error.lock().unwrap().clone() {
            return Err(fail(&message));
        }
        self.chunk_upserts.lock().unwrap().push(input);
        Ok(())
    }

    async fn update_paper_status(&self, input: PaperStatusUpdate) -> Result<(), ActivityError> {
        self.status_updates.lock().unwrap().push(input);
        Ok(())
    }

    async fn search_chunks(
        &self,
        _input: SearchChunksInput,
    ) -> Result<Vec<RetrievedChunk>, ActivityError> {
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn get_survey_paper_meta(
        &self,
        _corpus_id: &str,
        paper_ids: &[String],
    ) -> Result<Vec<SurveyPaperMeta>, ActivityError> {
        Ok(self
            .papers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| paper_ids.contains(&p.paper_id))
            .map(|p| SurveyPaperMeta {
                paper_id: p.paper_id.clone(),
                title: p.title.clone(),
                authors: p.authors.clone(),
                year: p.year,
                filename: p.filename.clone(),
            })
            .collect())
    }

    async fn update_survey_run(&self, input: SurveyRunUpdate) -> Result<(), ActivityError> {
        self.survey_updates.lock().unwrap().push(input);
        Ok(())
    }

    async fn log_llm_call(&self, input: LlmCallLog) -> Result<(), ActivityError> {
        self.audit_rows.lock().unwrap().push(input);
        Ok(())
    }

    async fn upsert_topic_graph(&self, input: TopicGraphEdge) -> Result<(), ActivityError> {
        self.topic_edges.lock().unwrap().push(input);
        Ok(())
    }

    async fn list_failed_papers(
        &self,
        _corpus_id: &str,
    ) -> Result<Vec<PaperSummary>, ActivityError> {
        Ok(self
            .papers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == "failed")
            .cloned()
            .collect())
    }

    async fn list_corpus_papers(
        &self,
        _corpus_id: &str,
    ) -> Result<Vec<PaperSummary>, ActivityError> {
        Ok(self.papers.lock().unwrap().clone())
    }

    async fn list_paper_chunks(
        &self,
        _corpus_id: &str,
        _paper_id: &str,
    ) -> Result<PaperChunks, ActivityError> {
        Ok(self.paper_chunks.lock().unwrap().clone())
    }

    async fn upsert_kg_triples(&self, input: UpsertKgTriplesInput) -> Result<(), ActivityError> {
        self.kg_upserts.lock().unwrap().push(input);
        Ok(())
    }

    async fn mark_kg_paper_run(&self, input: KgRunUpdate) -> Result<(), ActivityError> {
        self.kg_runs.lock().unwrap().push(input);
        Ok(())
    }

    async fn write_corpus_summary(
        &self,
        _corpus_id: &str,
        summary: Value,
    ) -> Result<(), ActivityError> {
        self.summaries.lock().unwrap().push(summary);
        Ok(())
    }

    async fn write_paper_artifacts(&self, input: PaperArtifacts) -> Result<(), ActivityError> {
        self.paper_artifacts.lock().unwrap().push(input);
        Ok(())
    }

    async fn write_survey_report(
        &self,
        input: SurveyReportInput,
    ) -> Result<String, ActivityError> {
        let ext = if input.output_format.eq_ignore_ascii_case("latex") { "tex" } else { "md" };
        let path = format!(
            "./data/out/{}/surveys/{}/report.{}",
            input.corpus_id, input.survey_run_id, ext
        );
        self.reports.lock().unwrap().push(input);
        Ok(path)
    }

    async fn write_run_manifest(
        &self,
        corpus_id: &str,
        run_id: &str,
        manifest: Value,
    ) -> Result<String, ActivityError> {
        let path = format!("./data/out/{}/runs/{}/manifest.json", corpus_id, run_id);
        self.manifests.lock().unwrap().push((run_id.to_string(), manifest));
        Ok(path)
    }
}

/// A host over in-memory persistence and a virtual clock.
pub fn test_host() -> (WorkflowHost, Arc<MemoryPersistence>, Arc<ManualClock>) {
    let persistence = Arc::new(MemoryPersistence::new());
    let clock = Arc::new(ManualClock::default());
    let host = WorkflowHost::builder()
        .persistence(persistence.clone())
        .clock(clock.clone())
        .build()
        .expect("host");
    (host, persistence, clock)
}

/// The mock as a trait object, the way workflows consume it.
pub fn surface(mock: &Arc<MockSurface>) -> Arc<dyn ActivitySurface> {
    mock.clone()
}
