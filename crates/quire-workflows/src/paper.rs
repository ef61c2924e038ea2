// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-paper processing pipeline.
//!
//! Linear steps with a query-observable status struct. Content errors (no
//! extractable text, invalid encoding after extraction) are terminal for the
//! paper and return `"failed"` so the parent ingest keeps going; anything
//! else propagates as a workflow-level error.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use quire_activities::types::{
    ChunkItem, ChunkTextInput, EmbedChunksInput, PaperArtifacts, PaperMetadata, PaperStatusUpdate,
    UpsertChunksInput,
};
use quire_activities::{ActivitySurface, is_no_text_error};
use quire_engine::{StepError, StepOptions, WorkflowCtx, WorkflowError};
use serde_json::json;

use crate::failover::{FailoverParams, ProviderFailover, embed_chunks_with_failover};
use crate::types::{PaperProcessInput, PaperStatus};
use crate::{default_chunk_version, default_count, default_embed_version, default_seconds, ids};

const FAIL_NO_TEXT: &str = "no extractable text found (OCR not enabled)";
const FAIL_BAD_ENCODING: &str = "paper contains invalid text encoding after extraction";

fn is_invalid_encoding_error(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("invalid byte sequence") || m.contains("sqlstate 22021")
}

/// Process one paper end to end. Returns `"processed"` or `"failed"`.
pub async fn paper_process_workflow(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: PaperProcessInput,
) -> Result<String, WorkflowError> {
    let filename = ids::file_name(&input.paper_path).to_string();
    let cooldown = Duration::from_secs(default_seconds(input.cooldown_seconds, 900));
    let mut state = ProviderFailover::new();
    let mut status = PaperStatus {
        paper_path: input.paper_path.clone(),
        current_step: "init".to_string(),
        status: "processing".to_string(),
        ..Default::default()
    };
    ctx.set_progress(&status);

    let enter = |status: &mut PaperStatus, ctx: &WorkflowCtx, step: &str| {
        status.current_step = step.to_string();
        status.steps.insert(step.to_string(), "processing".to_string());
        ctx.set_progress(status);
    };
    let done = |status: &mut PaperStatus, ctx: &WorkflowCtx, step: &str| {
        status.steps.insert(step.to_string(), "done".to_string());
        ctx.set_progress(status);
    };

    enter(&mut status, ctx, "compute_paper_id");
    let paper_id: String = {
        let acts2 = acts.clone();
        let path = input.paper_path.clone();
        ctx.step("compute-paper-id", StepOptions::default(), move || {
            let acts = acts2.clone();
            let path = path.clone();
            async move { acts.compute_paper_id(&path).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };
    status.paper_id = paper_id.clone();
    done(&mut status, ctx, "compute_paper_id");

    // Best-effort: a store hiccup here must not keep the paper from being
    // processed and recorded later.
    {
        let acts2 = acts.clone();
        let update = PaperStatusUpdate {
            paper_id: paper_id.clone(),
            corpus_id: input.corpus_id.clone(),
            filename: filename.clone(),
            status: "processing".to_string(),
            ..Default::default()
        };
        let _ = ctx
            .step("mark-processing", StepOptions::default(), move || {
                let acts = acts2.clone();
                let update = update.clone();
                async move { acts.update_paper_status(update).await }
            })
            .await;
    }

    enter(&mut status, ctx, "extract_text");
    let text: String = {
        let acts2 = acts.clone();
        let path = input.paper_path.clone();
        let result = ctx
            .step("extract-text", StepOptions::long_running(), move || {
                let acts = acts2.clone();
                let path = path.clone();
                async move { acts.extract_text(&path).await }
            })
            .await;
        match result {
            Ok(text) => text,
            Err(StepError::Failed(message)) if is_no_text_error(&message) => {
                return fail_paper(ctx, acts, &mut status, &input, &paper_id, &filename, FAIL_NO_TEXT)
                    .await;
            }
            Err(err) => return Err(err.into()),
        }
    };
    done(&mut status, ctx, "extract_text");

    enter(&mut status, ctx, "extract_metadata");
    let metadata: PaperMetadata = {
        let acts2 = acts.clone();
        let text2 = text.clone();
        ctx.step("extract-metadata", StepOptions::default(), move || {
            let acts = acts2.clone();
            let text = text2.clone();
            async move { acts.extract_metadata(&text).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };
    done(&mut status, ctx, "extract_metadata");

    enter(&mut status, ctx, "chunk_text");
    let chunks: Vec<ChunkItem> = {
        let acts2 = acts.clone();
        let chunk_input = ChunkTextInput {
            paper_id: paper_id.clone(),
            corpus_id: input.corpus_id.clone(),
            text,
            chunk_size: input.chunk_size,
            chunk_overlap: input.chunk_overlap,
            version: default_chunk_version(&input.chunk_version),
        };
        ctx.step("chunk-text", StepOptions::default(), move || {
            let acts = acts2.clone();
            let chunk_input = chunk_input.clone();
            async move { acts.chunk_text(chunk_input).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };
    done(&mut status, ctx, "chunk_text");

    enter(&mut status, ctx, "embed_chunks");
    let params = FailoverParams {
        provider_count: default_count(input.embed_providers),
        cooldown,
        preferred_index: input.preferred_embed_provider_index,
        strict: input.strict_embed_provider,
    };
    let embed_input = EmbedChunksInput {
        operation: "embed".to_string(),
        corpus_id: input.corpus_id.clone(),
        paper_id: paper_id.clone(),
        provider_index: 0,
        chunks: chunks.clone(),
    };
    let mut retry_counts = std::mem::take(&mut status.retry_counts);
    let embedded = embed_chunks_with_failover(
        ctx,
        acts,
        &mut state,
        &params,
        "embed-chunks",
        embed_input,
        &mut retry_counts,
    )
    .await;
    status.retry_counts = retry_counts;
    let embedded = embedded.map_err(WorkflowError::from)?;
    status.providers_used.push(embedded.provider_name.clone());
    done(&mut status, ctx, "embed_chunks");

    enter(&mut status, ctx, "upsert_chunks");
    {
        let acts2 = acts.clone();
        let upsert = UpsertChunksInput {
            chunks: chunks.clone(),
            vectors: embedded.vectors,
            embedding_version: default_embed_version(&input.embed_version),
        };
        let result = ctx
            .step("upsert-chunks", StepOptions::default(), move || {
                let acts = acts2.clone();
                let upsert = upsert.clone();
                async move { acts.upsert_chunks(upsert).await }
            })
            .await;
        match result {
            Ok(()) => {}
            Err(StepError::Failed(message)) if is_invalid_encoding_error(&message) => {
                return fail_paper(
                    ctx,
                    acts,
                    &mut status,
                    &input,
                    &paper_id,
                    &filename,
                    FAIL_BAD_ENCODING,
                )
                .await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    done(&mut status, ctx, "upsert_chunks");

    enter(&mut status, ctx, "write_artifacts");
    let generated_at = ctx.now("artifacts-generated-at").await?;
    {
        let acts2 = acts.clone();
        let artifacts = PaperArtifacts {
            corpus_id: input.corpus_id.clone(),
            paper_id: paper_id.clone(),
            metadata: json!({
                "paper_id": paper_id.clone(),
                "filename": filename.clone(),
                "title": metadata.title.clone(),
                "authors": metadata.authors.clone(),
                "chunk_count": chunks.len(),
            }),
            chunks,
            processing_log: json!({
                "status": "processed",
                "steps": status.steps.clone(),
                "generated_at": generated_at.to_rfc3339(),
            }),
        };
        ctx.step("write-artifacts", StepOptions::default(), move || {
            let acts = acts2.clone();
            let artifacts = artifacts.clone();
            async move { acts.write_paper_artifacts(artifacts).await }
        })
        .await
        .map_err(WorkflowError::from)?;
    }
    done(&mut status, ctx, "write_artifacts");

    enter(&mut status, ctx, "mark_processed");
    {
        let acts2 = acts.clone();
        let update = PaperStatusUpdate {
            paper_id: paper_id.clone(),
            corpus_id: input.corpus_id.clone(),
            filename: filename.clone(),
            title: metadata.title.clone(),
            authors: metadata.authors.clone(),
            status: "processed".to_string(),
            ..Default::default()
        };
        ctx.step("mark-processed", StepOptions::default(), move || {
            let acts = acts2.clone();
            let update = update.clone();
            async move { acts.update_paper_status(update).await }
        })
        .await
        .map_err(WorkflowError::from)?;
    }
    done(&mut status, ctx, "mark_processed");

    status.current_step = "done".to_string();
    status.status = "processed".to_string();
    ctx.set_progress(&status);
    info!(paper_id = %status.paper_id, "paper processed");
    Ok(status.status)
}

/// Terminal content-error path: record the failure and return `"failed"`
/// without erroring the workflow.
async fn fail_paper(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    status: &mut PaperStatus,
    input: &PaperProcessInput,
    paper_id: &str,
    filename: &str,
    fail_reason: &str,
) -> Result<String, WorkflowError> {
    status.status = "failed".to_string();
    status.fail_reason = fail_reason.to_string();
    status
        .steps
        .insert(status.current_step.clone(), "failed".to_string());
    ctx.set_progress(status);

    let acts2 = acts.clone();
    let update = PaperStatusUpdate {
        paper_id: paper_id.to_string(),
        corpus_id: input.corpus_id.clone(),
        filename: filename.to_string(),
        status: "failed".to_string(),
        fail_reason: fail_reason.to_string(),
        ..Default::default()
    };
    let _ = ctx
        .step("mark-failed", StepOptions::default(), move || {
            let acts = acts2.clone();
            let update = update.clone();
            async move { acts.update_paper_status(update).await }
        })
        .await;

    info!(paper_id = %paper_id, fail_reason, "paper failed");
    Ok(status.status.clone())
}
