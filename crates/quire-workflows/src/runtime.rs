// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedding-facing runtime.
//!
//! [`WorkflowRuntime`] is what the worker hands to the HTTP façade: it owns
//! the host and the activity surface, derives workflow ids, fills
//! environment-derived defaults into inputs (so workflow code never reads
//! the environment itself), and exposes progress queries.

use std::sync::Arc;

use serde_json::Value;

use quire_activities::ActivitySurface;
use quire_engine::{EngineError, WorkflowHandle, WorkflowHost, WorkflowStatus};

use crate::types::{
    BackfillInput, CorpusIngestInput, KgBackfillInput, PaperProcessInput, SurveyBuildInput,
};
use crate::{
    KIND_BACKFILL, KIND_CORPUS_INGEST, KIND_KG_BACKFILL, KIND_PAPER_PROCESS, KIND_SURVEY_BUILD,
    backfill_workflow, corpus_ingest_workflow, default_seconds, ids, kg_backfill_workflow,
    paper_process_workflow, survey_build_workflow,
};

/// Environment-derived defaults stamped into workflow inputs at start time.
#[derive(Debug, Clone)]
pub struct RuntimeDefaults {
    pub chunk_version: String,
    pub embed_version: String,
    pub cooldown_seconds: u64,
    pub ingest_max_children: usize,
    /// Number of embedding providers configured on this worker.
    pub embed_provider_count: usize,
    /// Number of LLM providers configured on this worker.
    pub llm_provider_count: usize,
    /// Opaque provider ref strings, in registry order.
    pub llm_provider_refs: Vec<String>,
    pub data_in_root: String,
}

impl Default for RuntimeDefaults {
    fn default() -> Self {
        Self {
            chunk_version: "v1".to_string(),
            embed_version: "v1".to_string(),
            cooldown_seconds: 900,
            ingest_max_children: 3,
            embed_provider_count: 1,
            llm_provider_count: 1,
            llm_provider_refs: vec!["mock".to_string()],
            data_in_root: "./data/in".to_string(),
        }
    }
}

/// The façade-facing runtime: start workflows by derived id, query progress.
#[derive(Clone)]
pub struct WorkflowRuntime {
    host: WorkflowHost,
    acts: Arc<dyn ActivitySurface>,
    defaults: RuntimeDefaults,
}

impl WorkflowRuntime {
    pub fn new(
        host: WorkflowHost,
        acts: Arc<dyn ActivitySurface>,
        defaults: RuntimeDefaults,
    ) -> Self {
        Self {
            host,
            acts,
            defaults,
        }
    }

    /// The underlying host, for status and instance queries.
    pub fn host(&self) -> &WorkflowHost {
        &self.host
    }

    /// Start ingesting a corpus directory.
    pub async fn start_corpus_ingest(
        &self,
        corpus_id: &str,
        input_dir: &str,
    ) -> Result<WorkflowHandle<String>, EngineError> {
        let input = CorpusIngestInput {
            corpus_id: corpus_id.to_string(),
            input_dir: input_dir.to_string(),
            max_concurrent_children: self.defaults.ingest_max_children,
            embed_providers: self.defaults.embed_provider_count,
            cooldown_seconds: self.defaults.cooldown_seconds,
            chunk_version: self.defaults.chunk_version.clone(),
            embed_version: self.defaults.embed_version.clone(),
        };
        let acts = self.acts.clone();
        self.host
            .start(
                &ids::corpus_ingest_id(corpus_id),
                KIND_CORPUS_INGEST,
                move |ctx| async move { corpus_ingest_workflow(&ctx, &acts, input).await },
            )
            .await
    }

    /// Start a single-paper pipeline.
    pub async fn start_paper_process(
        &self,
        mut input: PaperProcessInput,
    ) -> Result<WorkflowHandle<String>, EngineError> {
        if input.embed_providers == 0 {
            input.embed_providers = self.defaults.embed_provider_count;
        }
        input.cooldown_seconds = default_seconds(input.cooldown_seconds, self.defaults.cooldown_seconds);
        let workflow_id =
            ids::paper_process_id(&input.corpus_id, ids::file_name(&input.paper_path));
        let acts = self.acts.clone();
        self.host
            .start(&workflow_id, KIND_PAPER_PROCESS, move |ctx| async move {
                paper_process_workflow(&ctx, &acts, input).await
            })
            .await
    }

    /// Start survey generation.
    pub async fn start_survey_build(
        &self,
        mut input: SurveyBuildInput,
    ) -> Result<WorkflowHandle<String>, EngineError> {
        if input.embed_providers == 0 {
            input.embed_providers = self.defaults.embed_provider_count;
        }
        if input.llm_providers == 0 {
            input.llm_providers = self.defaults.llm_provider_count;
        }
        if input.llm_provider_refs.is_empty() {
            input.llm_provider_refs = self.defaults.llm_provider_refs.clone();
        }
        if input.embed_version.trim().is_empty() {
            input.embed_version = self.defaults.embed_version.clone();
        }
        input.cooldown_seconds = default_seconds(input.cooldown_seconds, self.defaults.cooldown_seconds);
        let workflow_id = ids::survey_build_id(&input.survey_run_id);
        let acts = self.acts.clone();
        self.host
            .start(&workflow_id, KIND_SURVEY_BUILD, move |ctx| async move {
                survey_build_workflow(&ctx, &acts, input).await
            })
            .await
    }

    /// Start a backfill run. `unix` (the caller's submit time) participates
    /// in the workflow id so distinct submissions get distinct runs.
    pub async fn start_backfill(
        &self,
        mut input: BackfillInput,
        unix: i64,
    ) -> Result<WorkflowHandle<String>, EngineError> {
        if input.embed_providers == 0 {
            input.embed_providers = self.defaults.embed_provider_count;
        }
        if input.llm_providers == 0 {
            input.llm_providers = self.defaults.llm_provider_count;
        }
        if input.llm_provider_refs.is_empty() {
            input.llm_provider_refs = self.defaults.llm_provider_refs.clone();
        }
        if input.data_in_root.trim().is_empty() {
            input.data_in_root = self.defaults.data_in_root.clone();
        }
        input.cooldown_seconds = default_seconds(input.cooldown_seconds, self.defaults.cooldown_seconds);
        let workflow_id = ids::backfill_id(&input.mode, &input.corpus_id, unix);
        let acts = self.acts.clone();
        self.host
            .start(&workflow_id, KIND_BACKFILL, move |ctx| async move {
                backfill_workflow(&ctx, &acts, input).await
            })
            .await
    }

    /// Start corpus-scoped KG extraction.
    pub async fn start_kg_backfill(
        &self,
        mut input: KgBackfillInput,
        unix: i64,
    ) -> Result<WorkflowHandle<String>, EngineError> {
        if input.llm_providers == 0 {
            input.llm_providers = self.defaults.llm_provider_count;
        }
        if input.llm_provider_refs.is_empty() {
            input.llm_provider_refs = self.defaults.llm_provider_refs.clone();
        }
        input.cooldown_seconds = default_seconds(input.cooldown_seconds, self.defaults.cooldown_seconds);
        let workflow_id = ids::kg_backfill_id(&input.corpus_id, unix);
        let acts = self.acts.clone();
        self.host
            .start(&workflow_id, KIND_KG_BACKFILL, move |ctx| async move {
                kg_backfill_workflow(&ctx, &acts, input).await
            })
            .await
    }

    /// Current progress value for a workflow (the query-handler surface).
    pub fn get_progress(&self, workflow_id: &str) -> Option<Value> {
        self.host.query(workflow_id)
    }

    /// Coarse status of a workflow.
    pub async fn status(&self, workflow_id: &str) -> Result<WorkflowStatus, EngineError> {
        self.host.status(workflow_id).await
    }
}
