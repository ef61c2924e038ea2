// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Knowledge-graph extraction workflows.
//!
//! The corpus-scoped workflow fans out to per-paper workflows in bounded
//! batches. The paper-scoped workflow extracts triples chunk by chunk and
//! marks its run state keyed by `(corpus, paper, prompt_hash, model_version)`;
//! it is `failed` only when every chunk's LLM call failed, and in that case
//! nothing is upserted.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::info;

use quire_activities::ActivitySurface;
use quire_activities::types::{
    KgRunUpdate, KgTripleRecord, LlmGenerateInput, PaperChunks, UpsertKgTriplesInput,
};
use quire_engine::{StepError, StepOptions, WorkflowCtx, WorkflowError};
use quire_graph::{build_chunk_extraction_prompt, parse_triples_json, prompt_hash};

use crate::failover::{FailoverError, FailoverParams, ProviderFailover, generate_with_failover};
use crate::types::{KgBackfillInput, KgBackfillProgress, KgExtractPaperInput};
use crate::{KIND_KG_EXTRACT_PAPER, default_count, default_seconds, ids};

const DEFAULT_MAX_CONCURRENT: usize = 4;

fn default_prompt_version(v: &str) -> String {
    let v = v.trim();
    if v.is_empty() { "v1".to_string() } else { v.to_string() }
}

fn default_model_version(v: &str) -> String {
    let v = v.trim();
    if v.is_empty() { "kg-llm-v1".to_string() } else { v.to_string() }
}

/// Corpus-scoped extraction: fan out over papers. Returns `"completed"`.
pub async fn kg_backfill_workflow(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: KgBackfillInput,
) -> Result<String, WorkflowError> {
    let mut progress = KgBackfillProgress {
        corpus_id: input.corpus_id.clone(),
        ..Default::default()
    };
    ctx.set_progress(&progress);

    let papers = {
        let acts2 = acts.clone();
        let corpus_id = input.corpus_id.clone();
        ctx.step("list-corpus-papers", StepOptions::default(), move || {
            let acts = acts2.clone();
            let corpus_id = corpus_id.clone();
            async move { acts.list_corpus_papers(&corpus_id).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };
    progress.total = papers.len();
    ctx.set_progress(&progress);

    let max_concurrent = if input.max_concurrent == 0 {
        DEFAULT_MAX_CONCURRENT
    } else {
        input.max_concurrent
    };

    for batch in papers.chunks(max_concurrent) {
        let mut futures = Vec::with_capacity(batch.len());
        for paper in batch {
            progress
                .per_paper_status
                .insert(paper.paper_id.clone(), "running".to_string());

            let child_id = format!(
                "{}-paper-{}",
                ctx.instance_id(),
                ids::sanitize_id(&paper.paper_id)
            );
            let child_input = KgExtractPaperInput {
                corpus_id: input.corpus_id.clone(),
                paper_id: paper.paper_id.clone(),
                prompt_version: default_prompt_version(&input.prompt_version),
                model_version: default_model_version(&input.model_version),
                llm_providers: default_count(input.llm_providers),
                llm_provider_refs: input.llm_provider_refs.clone(),
                cooldown_seconds: default_seconds(input.cooldown_seconds, 900),
            };
            let acts2 = acts.clone();
            let paper_id = paper.paper_id.clone();
            futures.push(async move {
                let outcome = ctx
                    .child(&child_id, KIND_KG_EXTRACT_PAPER, move |child_ctx| async move {
                        kg_extract_paper_workflow(&child_ctx, &acts2, child_input).await
                    })
                    .await;
                (paper_id, outcome)
            });
        }
        ctx.set_progress(&progress);

        for (paper_id, outcome) in join_all(futures).await {
            match outcome {
                Ok(state) => {
                    if state != "completed" {
                        progress.failed += 1;
                    }
                    progress.done += 1;
                    progress.per_paper_status.insert(paper_id, state);
                }
                Err(_) => {
                    progress.failed += 1;
                    progress
                        .per_paper_status
                        .insert(paper_id, "failed".to_string());
                }
            }
        }
        ctx.set_progress(&progress);
    }

    info!(
        corpus_id = %input.corpus_id,
        total = progress.total,
        failed = progress.failed,
        "kg backfill completed"
    );
    Ok("completed".to_string())
}

/// Paper-scoped extraction. Returns `"completed"` or `"failed"`.
pub async fn kg_extract_paper_workflow(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: KgExtractPaperInput,
) -> Result<String, WorkflowError> {
    let prompt_version = default_prompt_version(&input.prompt_version);
    let model_version = default_model_version(&input.model_version);
    let run_prompt_hash = prompt_hash(&prompt_version);

    mark_run(ctx, acts, "mark-running", &input, &run_prompt_hash, &model_version, "running", 0, "")
        .await;

    let paper: PaperChunks = {
        let acts2 = acts.clone();
        let corpus_id = input.corpus_id.clone();
        let paper_id = input.paper_id.clone();
        let result = ctx
            .step("list-paper-chunks", StepOptions::default(), move || {
                let acts = acts2.clone();
                let corpus_id = corpus_id.clone();
                let paper_id = paper_id.clone();
                async move { acts.list_paper_chunks(&corpus_id, &paper_id).await }
            })
            .await;
        match result {
            Ok(out) => out,
            Err(StepError::Engine(e)) => return Err(e.into()),
            Err(StepError::Failed(message)) => {
                mark_run(
                    ctx,
                    acts,
                    "mark-failed-load",
                    &input,
                    &run_prompt_hash,
                    &model_version,
                    "failed",
                    0,
                    &message,
                )
                .await;
                return Ok("failed".to_string());
            }
        }
    };

    let params = FailoverParams::rotating(
        default_count(input.llm_providers),
        Duration::from_secs(default_seconds(input.cooldown_seconds, 900)),
    );
    let mut state = ProviderFailover::new();
    let mut retry_counts = Default::default();
    let mut triples: Vec<KgTripleRecord> = Vec::new();
    let mut llm_failures = 0usize;
    let mut last_llm_err = String::new();

    for (ci, chunk) in paper.chunks.iter().enumerate() {
        let prompt = build_chunk_extraction_prompt(&paper.title, &chunk.text);
        let response = generate_with_failover(
            ctx,
            acts,
            &mut state,
            &params,
            &input.llm_provider_refs,
            &format!("kg-chunk-{}", ci),
            LlmGenerateInput {
                operation: "kg_extract".to_string(),
                corpus_id: input.corpus_id.clone(),
                paper_id: input.paper_id.clone(),
                prompt,
                ..Default::default()
            },
            &mut retry_counts,
        )
        .await;

        match response {
            Ok(out) => {
                for triple in parse_triples_json(&out.text) {
                    triples.push(KgTripleRecord {
                        source_type: triple.source_type.as_str().to_string(),
                        source_name: triple.source_name,
                        relation_type: triple.relation_type.as_str().to_string(),
                        target_type: triple.target_type.as_str().to_string(),
                        target_name: triple.target_name,
                        evidence: triple.evidence,
                        confidence: triple.confidence,
                        chunk_id: chunk.chunk_id.clone(),
                    });
                }
            }
            Err(FailoverError::Engine(e)) => return Err(e.into()),
            Err(err) => {
                llm_failures += 1;
                last_llm_err = err.to_string();
            }
        }
    }

    if !paper.chunks.is_empty() && llm_failures == paper.chunks.len() {
        mark_run(
            ctx,
            acts,
            "mark-failed-llm",
            &input,
            &run_prompt_hash,
            &model_version,
            "failed",
            0,
            &format!("kg extraction exhausted all llm providers: {}", last_llm_err),
        )
        .await;
        return Ok("failed".to_string());
    }

    {
        let acts2 = acts.clone();
        let upsert = UpsertKgTriplesInput {
            corpus_id: input.corpus_id.clone(),
            paper_id: input.paper_id.clone(),
            prompt_hash: run_prompt_hash.clone(),
            model_version: model_version.clone(),
            triples: triples.clone(),
        };
        let result = ctx
            .step("upsert-triples", StepOptions::default(), move || {
                let acts = acts2.clone();
                let upsert = upsert.clone();
                async move { acts.upsert_kg_triples(upsert).await }
            })
            .await;
        match result {
            Ok(()) => {}
            Err(StepError::Engine(e)) => return Err(e.into()),
            Err(StepError::Failed(message)) => {
                mark_run(
                    ctx,
                    acts,
                    "mark-failed-upsert",
                    &input,
                    &run_prompt_hash,
                    &model_version,
                    "failed",
                    triples.len(),
                    &message,
                )
                .await;
                return Ok("failed".to_string());
            }
        }
    }

    mark_run(
        ctx,
        acts,
        "mark-completed",
        &input,
        &run_prompt_hash,
        &model_version,
        "completed",
        triples.len(),
        "",
    )
    .await;
    info!(
        paper_id = %input.paper_id,
        triples = triples.len(),
        "kg extraction completed"
    );
    Ok("completed".to_string())
}

#[allow(clippy::too_many_arguments)]
async fn mark_run(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    key: &str,
    input: &KgExtractPaperInput,
    run_prompt_hash: &str,
    model_version: &str,
    status: &str,
    triple_count: usize,
    last_error: &str,
) {
    let acts = acts.clone();
    let update = KgRunUpdate {
        corpus_id: input.corpus_id.clone(),
        paper_id: input.paper_id.clone(),
        prompt_hash: run_prompt_hash.to_string(),
        model_version: model_version.to_string(),
        status: status.to_string(),
        triple_count,
        last_error: last_error.to_string(),
    };
    let _ = ctx
        .step(key, StepOptions::default(), move || {
            let acts = acts.clone();
            let update = update.clone();
            async move { acts.mark_kg_paper_run(update).await }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_defaults() {
        assert_eq!(default_prompt_version(""), "v1");
        assert_eq!(default_prompt_version("v3"), "v3");
        assert_eq!(default_model_version(""), "kg-llm-v1");
        assert_eq!(default_model_version("kg-llm-v2"), "kg-llm-v2");
    }
}
