// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Corpus ingest: fan-out/fan-in over PDFs with bounded child batches.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tracing::info;

use quire_activities::ActivitySurface;
use quire_engine::{StepOptions, WorkflowCtx, WorkflowError};

use crate::types::{CorpusIngestInput, CorpusIngestProgress, PaperProcessInput};
use crate::{
    KIND_PAPER_PROCESS, default_chunk_version, default_embed_version, ids, paper_process_workflow,
};

const DEFAULT_MAX_CHILDREN: usize = 3;

/// Ingest a corpus directory. Returns `"completed"`.
///
/// Children run in batches of at most `max_concurrent_children`; a child
/// that returns `"failed"` or errors out never cancels its siblings. The
/// terminal progress satisfies `total == done + infrastructure_failures`.
pub async fn corpus_ingest_workflow(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: CorpusIngestInput,
) -> Result<String, WorkflowError> {
    let mut progress = CorpusIngestProgress {
        corpus_id: input.corpus_id.clone(),
        ..Default::default()
    };
    ctx.set_progress(&progress);

    let paths: Vec<String> = {
        let acts2 = acts.clone();
        let input_dir = input.input_dir.clone();
        ctx.step("list-pdfs", StepOptions::default(), move || {
            let acts = acts2.clone();
            let input_dir = input_dir.clone();
            async move { acts.list_pdfs(&input_dir).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };
    progress.total = paths.len();
    ctx.set_progress(&progress);

    let max_children = if input.max_concurrent_children == 0 {
        DEFAULT_MAX_CHILDREN
    } else {
        input.max_concurrent_children
    };

    for batch in paths.chunks(max_children) {
        let mut futures = Vec::with_capacity(batch.len());
        for path in batch {
            let child_id = ids::paper_process_id(&input.corpus_id, ids::file_name(path));
            progress
                .per_paper_status
                .insert(path.clone(), "processing".to_string());
            progress
                .child_workflow_ids
                .insert(path.clone(), child_id.clone());

            let child_input = PaperProcessInput {
                corpus_id: input.corpus_id.clone(),
                paper_path: path.clone(),
                chunk_version: default_chunk_version(&input.chunk_version),
                embed_version: default_embed_version(&input.embed_version),
                embed_providers: input.embed_providers,
                cooldown_seconds: input.cooldown_seconds,
                ..Default::default()
            };
            let acts2 = acts.clone();
            let path2 = path.clone();
            futures.push(async move {
                let outcome = ctx
                    .child(&child_id, KIND_PAPER_PROCESS, move |child_ctx| async move {
                        paper_process_workflow(&child_ctx, &acts2, child_input).await
                    })
                    .await;
                (path2, outcome)
            });
        }
        ctx.set_progress(&progress);

        for (path, outcome) in join_all(futures).await {
            match outcome {
                Ok(child_status) => {
                    if child_status == "failed" {
                        progress.failed += 1;
                    }
                    progress.done += 1;
                    progress.per_paper_status.insert(path, child_status);
                }
                Err(_) => {
                    progress.failed += 1;
                    progress.per_paper_status.insert(path, "failed".to_string());
                }
            }
        }
        ctx.set_progress(&progress);
    }

    let generated_at = ctx.now("summary-generated-at").await?;
    {
        let acts2 = acts.clone();
        let corpus_id = input.corpus_id.clone();
        let summary = json!({
            "corpus_id": progress.corpus_id.clone(),
            "total": progress.total,
            "done": progress.done,
            "failed": progress.failed,
            "per_paper_status": progress.per_paper_status.clone(),
            "generated_at": generated_at.to_rfc3339(),
        });
        let _ = ctx
            .step("write-corpus-summary", StepOptions::default(), move || {
                let acts = acts2.clone();
                let corpus_id = corpus_id.clone();
                let summary = summary.clone();
                async move { acts.write_corpus_summary(&corpus_id, summary).await }
            })
            .await;
    }

    info!(
        corpus_id = %input.corpus_id,
        total = progress.total,
        done = progress.done,
        failed = progress.failed,
        "corpus ingest completed"
    );
    Ok("completed".to_string())
}
