// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backfill: mode-dispatched reconciliation writing a versioned manifest.
//!
//! Modes (case-insensitive):
//! - `RETRY_FAILED_PAPERS` re-runs the paper pipeline on failed papers.
//! - `REEMBED_ALL_PAPERS` re-runs every paper with the embed provider pinned
//!   (strict mode) so the new version's vectors come from one source.
//! - `REGENERATE_SURVEY` re-runs survey generation under a derived run id.
//!
//! An unknown mode is an input error with no side effects.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use quire_activities::ActivitySurface;
use quire_engine::{StepOptions, WorkflowCtx, WorkflowError};

use crate::types::{BackfillInput, PaperProcessInput, SurveyBuildInput};
use crate::{
    KIND_PAPER_PROCESS, KIND_SURVEY_BUILD, default_chunk_version, default_count,
    default_embed_version, default_seconds, ids, paper_process_workflow, survey_build_workflow,
};

const SURVEY_PROMPT_VERSION: &str = "v1";

fn backfill_paper_path(input: &BackfillInput, filename: &str) -> String {
    let base = input.data_in_root.trim();
    let base = if base.is_empty() { "./data/in" } else { base };
    format!("{}/{}/{}", base.trim_end_matches('/'), input.corpus_id, filename)
}

/// Run one reconciliation pass. Returns the manifest path.
pub async fn backfill_workflow(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: BackfillInput,
) -> Result<String, WorkflowError> {
    let mode = input.mode.trim().to_uppercase();
    if !matches!(
        mode.as_str(),
        "RETRY_FAILED_PAPERS" | "REEMBED_ALL_PAPERS" | "REGENERATE_SURVEY"
    ) {
        return Err(WorkflowError::Input(format!(
            "unsupported backfill mode: {}",
            input.mode
        )));
    }

    let run_id = ctx.instance_id().to_string();
    let started_at = ctx.now("started-at").await?;
    let mut manifest = json!({
        "run_id": run_id.clone(),
        "mode": input.mode.clone(),
        "corpus_id": input.corpus_id.clone(),
        "versions": {
            "chunk": default_chunk_version(&input.chunk_version),
            "embed": default_embed_version(&input.embed_version),
            "survey_prompt": SURVEY_PROMPT_VERSION,
        },
        "started_at": started_at.to_rfc3339(),
    });

    match mode.as_str() {
        "RETRY_FAILED_PAPERS" => {
            let failed = list_papers(ctx, acts, "list-failed-papers", &input.corpus_id, true).await?;
            let mut retried = 0usize;
            for paper in &failed {
                if run_paper_child(ctx, acts, &input, &run_id, &paper.filename, false).await {
                    retried += 1;
                }
            }
            manifest["retried_failed_papers"] = json!(retried);
        }
        "REEMBED_ALL_PAPERS" => {
            let all = list_papers(ctx, acts, "list-corpus-papers", &input.corpus_id, false).await?;
            let mut processed = 0usize;
            for paper in &all {
                if paper.filename.trim().is_empty() {
                    continue;
                }
                if run_paper_child(ctx, acts, &input, &run_id, &paper.filename, true).await {
                    processed += 1;
                }
            }
            manifest["reembedded_papers"] = json!(processed);
            manifest["total_papers_seen"] = json!(all.len());
        }
        "REGENERATE_SURVEY" => {
            let survey_run_id = if input.survey_run_id.trim().is_empty() {
                ids::sanitize_id(&format!("{}-{}", input.corpus_id, started_at.timestamp()))
            } else {
                input.survey_run_id.trim().to_string()
            };
            let child_id = ids::survey_build_id(&survey_run_id);
            let child_input = SurveyBuildInput {
                survey_run_id: survey_run_id.clone(),
                corpus_id: input.corpus_id.clone(),
                topics: input.topics.clone(),
                questions: input.questions.clone(),
                embed_providers: default_count(input.embed_providers),
                llm_providers: default_count(input.llm_providers),
                llm_provider_refs: input.llm_provider_refs.clone(),
                cooldown_seconds: default_seconds(input.cooldown_seconds, 900),
                embed_version: default_embed_version(&input.embed_version),
                ..Default::default()
            };
            let acts2 = acts.clone();
            let out_path: String = ctx
                .child(&child_id, KIND_SURVEY_BUILD, move |child_ctx| async move {
                    survey_build_workflow(&child_ctx, &acts2, child_input).await
                })
                .await
                .map_err(WorkflowError::from)?;
            manifest["regenerated_survey_run_id"] = json!(survey_run_id);
            manifest["report_path"] = json!(out_path);
        }
        _ => unreachable!("mode validated above"),
    }

    let path: String = {
        let acts2 = acts.clone();
        let corpus_id = input.corpus_id.clone();
        let run_id2 = run_id.clone();
        let manifest2 = manifest.clone();
        ctx.step("write-manifest", StepOptions::default(), move || {
            let acts = acts2.clone();
            let corpus_id = corpus_id.clone();
            let run_id = run_id2.clone();
            let manifest = manifest2.clone();
            async move { acts.write_run_manifest(&corpus_id, &run_id, manifest).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };

    info!(run_id = %run_id, mode = %mode, manifest = %path, "backfill completed");
    Ok(path)
}

async fn list_papers(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    key: &str,
    corpus_id: &str,
    failed_only: bool,
) -> Result<Vec<quire_activities::types::PaperSummary>, WorkflowError> {
    let acts = acts.clone();
    let corpus_id = corpus_id.to_string();
    ctx.step(key, StepOptions::default(), move || {
        let acts = acts.clone();
        let corpus_id = corpus_id.clone();
        async move {
            if failed_only {
                acts.list_failed_papers(&corpus_id).await
            } else {
                acts.list_corpus_papers(&corpus_id).await
            }
        }
    })
    .await
    .map_err(WorkflowError::from)
}

/// Run one paper child under this backfill run. Children get run-scoped ids
/// so a reconciliation actually re-processes papers instead of reusing the
/// ingest-time instance. Returns true when the child completed.
async fn run_paper_child(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: &BackfillInput,
    run_id: &str,
    filename: &str,
    strict_reembed: bool,
) -> bool {
    let child_id = format!("{}-paper-{}", run_id, ids::sanitize_id(filename));
    let child_input = PaperProcessInput {
        corpus_id: input.corpus_id.clone(),
        paper_path: backfill_paper_path(input, filename),
        chunk_version: default_chunk_version(&input.chunk_version),
        embed_version: default_embed_version(&input.embed_version),
        embed_providers: default_count(input.embed_providers),
        preferred_embed_provider_index: input.preferred_embed_provider_index,
        strict_embed_provider: strict_reembed || input.strict_embed_provider,
        cooldown_seconds: default_seconds(input.cooldown_seconds, 900),
        ..Default::default()
    };
    let acts2 = acts.clone();
    let outcome: Result<String, _> = ctx
        .child(&child_id, KIND_PAPER_PROCESS, move |child_ctx| async move {
            paper_process_workflow(&child_ctx, &acts2, child_input).await
        })
        .await;
    outcome.is_ok()
}
