// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow tests over in-memory persistence, a virtual clock, and the
//! scripted activity surface.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{MockSurface, surface, test_host};
use quire_activities::types::{LlmGenerateOutput, PaperChunk, PaperChunks, PaperSummary, RetrievedChunk};
use quire_engine::{WorkflowClock, WorkflowError};
use quire_workflows::types::*;
use quire_workflows::{
    KIND_BACKFILL, KIND_CORPUS_INGEST, KIND_KG_EXTRACT_PAPER, KIND_PAPER_PROCESS,
    KIND_SURVEY_BUILD, backfill_workflow, corpus_ingest_workflow, ids, kg_extract_paper_workflow,
    paper_process_workflow, survey_build_workflow,
};

fn paper_input(path: &str) -> PaperProcessInput {
    PaperProcessInput {
        corpus_id: "c1".to_string(),
        paper_path: path.to_string(),
        embed_providers: 1,
        cooldown_seconds: 10,
        ..Default::default()
    }
}

fn retrieved(paper_id: &str, chunk_id: &str, title: &str) -> RetrievedChunk {
    RetrievedChunk {
        paper_id: paper_id.to_string(),
        chunk_id: chunk_id.to_string(),
        title: title.to_string(),
        snippet: String::new(),
        score: 0.9,
        text: "evidence text".to_string(),
    }
}

// ============================================================================
// Paper Process
// ============================================================================

#[tokio::test]
async fn test_paper_process_happy_path() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    let acts = surface(&mock);

    let handle = host
        .start("paper-c1-a-pdf", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, paper_input("./data/in/c1/a.pdf")).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "processed");

    let updates = mock.status_updates.lock().unwrap().clone();
    assert_eq!(updates.first().unwrap().status, "processing");
    let last = updates.last().unwrap();
    assert_eq!(last.status, "processed");
    assert_eq!(last.title, "A Study of Things");
    assert_eq!(last.authors, "A. Researcher");

    // Chunks were upserted with one vector per chunk.
    let upserts = mock.chunk_upserts.lock().unwrap().clone();
    assert_eq!(upserts.len(), 1);
    assert!(!upserts[0].chunks.is_empty());
    assert_eq!(upserts[0].chunks.len(), upserts[0].vectors.len());
    assert!(upserts[0].vectors.iter().all(|v| v.len() == 8));
    assert_eq!(upserts[0].embedding_version, "v1");

    // Artifacts carry the chunk count; the audit has exactly one ok row.
    let artifacts = mock.paper_artifacts.lock().unwrap().clone();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(
        artifacts[0].metadata["chunk_count"],
        artifacts[0].chunks.len()
    );
    assert_eq!(mock.audit_error_types(), vec!["ok"]);

    // The progress query shows the terminal step map.
    let progress = host.query("paper-c1-a-pdf").unwrap();
    assert_eq!(progress["status"], "processed");
    assert_eq!(progress["steps"]["embed_chunks"], "done");
}

#[tokio::test]
async fn test_paper_process_no_text_is_terminal_not_an_error() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    mock.no_text_paths
        .lock()
        .unwrap()
        .insert("./data/in/c1/empty.pdf".to_string());
    let acts = surface(&mock);

    let handle = host
        .start("paper-c1-empty-pdf", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, paper_input("./data/in/c1/empty.pdf")).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "failed");

    let last = mock.final_paper_status().unwrap();
    assert_eq!(last.status, "failed");
    assert!(last.fail_reason.starts_with("no extractable text"));
    // Nothing downstream of extraction ran.
    assert!(mock.embed_calls.lock().unwrap().is_empty());
    assert!(mock.chunk_upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_paper_process_invalid_encoding_is_terminal() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.upsert_chunks_error.lock().unwrap() =
        Some("ERROR: invalid byte sequence for encoding \"UTF8\"".to_string());
    let acts = surface(&mock);

    let handle = host
        .start("paper-c1-bad-pdf", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, paper_input("./data/in/c1/bad.pdf")).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "failed");

    let last = mock.final_paper_status().unwrap();
    assert_eq!(last.status, "failed");
    assert_eq!(
        last.fail_reason,
        "paper contains invalid text encoding after extraction"
    );
}

// ============================================================================
// Provider failover
// ============================================================================

#[tokio::test]
async fn test_failover_rate_backoff_then_quota_cooldown_then_mock() {
    let (host, _, clock) = test_host();
    let mock = Arc::new(MockSurface::new());
    {
        let mut script = mock.embed_script.lock().unwrap();
        script.push_back(Err("openai embedding error 429: Too Many Requests".to_string()));
        script.push_back(Err("openai embedding error 429: insufficient_quota".to_string()));
    }
    let acts = surface(&mock);
    let before = clock.now();

    let mut input = paper_input("./data/in/c1/a.pdf");
    input.embed_providers = 2;
    let handle = host
        .start("paper-failover", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, input).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "processed");

    // Provider 0 was retried in place after the 429, then disabled on quota;
    // provider 1 (the mock) finished the job.
    let indices: Vec<usize> = mock
        .embed_calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.provider_index)
        .collect();
    assert_eq!(indices, vec![0, 0, 1]);
    assert_eq!(mock.audit_error_types(), vec!["rate", "quota", "ok"]);

    // The rate backoff slept 2s of workflow time.
    assert_eq!(clock.now() - before, chrono::Duration::seconds(2));
}

#[tokio::test]
async fn test_failover_strict_mode_pins_every_attempt() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    mock.embed_script
        .lock()
        .unwrap()
        .push_back(Err("upstream timeout".to_string()));
    let acts = surface(&mock);

    let mut input = paper_input("./data/in/c1/a.pdf");
    input.embed_providers = 2;
    input.preferred_embed_provider_index = Some(1);
    input.strict_embed_provider = true;
    let handle = host
        .start("paper-strict", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, input).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "processed");

    let indices: Vec<usize> = mock
        .embed_calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.provider_index)
        .collect();
    assert_eq!(indices, vec![1, 1]);
}

#[tokio::test]
async fn test_failover_exhaustion_is_a_workflow_error() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    mock.embed_fail_paper_ids
        .lock()
        .unwrap()
        .insert("id-a.pdf".to_string());
    let acts = surface(&mock);

    let handle = host
        .start("paper-exhausted", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, paper_input("./data/in/c1/a.pdf")).await
        })
        .await
        .unwrap();
    let err = handle.result().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Step(_)));
    assert!(err.to_string().contains("bad request"));
}

// ============================================================================
// Corpus Ingest
// ============================================================================

#[tokio::test]
async fn test_corpus_ingest_fan_in_counts_and_summary() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.pdfs.lock().unwrap() = vec![
        "./data/in/c1/a.pdf".to_string(),
        "./data/in/c1/b.pdf".to_string(),
        "./data/in/c1/c.pdf".to_string(),
    ];
    mock.no_text_paths
        .lock()
        .unwrap()
        .insert("./data/in/c1/b.pdf".to_string());
    let acts = surface(&mock);

    let input = CorpusIngestInput {
        corpus_id: "c1".to_string(),
        input_dir: "./data/in/c1".to_string(),
        max_concurrent_children: 2,
        embed_providers: 1,
        cooldown_seconds: 10,
        ..Default::default()
    };
    let handle = host
        .start(
            &ids::corpus_ingest_id("c1"),
            KIND_CORPUS_INGEST,
            move |ctx| async move { corpus_ingest_workflow(&ctx, &acts, input).await },
        )
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "completed");

    let progress = host.query("ingest-c1").unwrap();
    assert_eq!(progress["total"], 3);
    assert_eq!(progress["done"], 3);
    assert_eq!(progress["failed"], 1);
    assert_eq!(progress["per_paper_status"]["./data/in/c1/b.pdf"], "failed");
    assert_eq!(
        progress["child_workflow_ids"]["./data/in/c1/a.pdf"],
        "paper-c1-a-pdf"
    );

    let summaries = mock.summaries.lock().unwrap().clone();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["total"], 3);
    assert_eq!(summaries[0]["failed"], 1);
}

#[tokio::test]
async fn test_corpus_ingest_bounds_child_concurrency() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::with_extract_delay(20));
    *mock.pdfs.lock().unwrap() = (0..6)
        .map(|i| format!("./data/in/c1/p{}.pdf", i))
        .collect();
    let acts = surface(&mock);

    let input = CorpusIngestInput {
        corpus_id: "c1".to_string(),
        input_dir: "./data/in/c1".to_string(),
        max_concurrent_children: 2,
        embed_providers: 1,
        cooldown_seconds: 10,
        ..Default::default()
    };
    let handle = host
        .start("ingest-bounded", KIND_CORPUS_INGEST, move |ctx| async move {
            corpus_ingest_workflow(&ctx, &acts, input).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "completed");
    assert!(mock.max_inflight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_corpus_ingest_child_infrastructure_error_does_not_propagate() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.pdfs.lock().unwrap() = vec![
        "./data/in/c1/a.pdf".to_string(),
        "./data/in/c1/z.pdf".to_string(),
    ];
    // Paper a exhausts its single embed provider: a workflow-level failure.
    mock.embed_fail_paper_ids
        .lock()
        .unwrap()
        .insert("id-a.pdf".to_string());
    let acts = surface(&mock);

    let input = CorpusIngestInput {
        corpus_id: "c1".to_string(),
        input_dir: "./data/in/c1".to_string(),
        embed_providers: 1,
        cooldown_seconds: 10,
        ..Default::default()
    };
    let handle = host
        .start("ingest-infra", KIND_CORPUS_INGEST, move |ctx| async move {
            corpus_ingest_workflow(&ctx, &acts, input).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "completed");

    let progress = host.query("ingest-infra").unwrap();
    assert_eq!(progress["total"], 2);
    // The errored child is counted failed but not done.
    assert_eq!(progress["done"], 1);
    assert_eq!(progress["failed"], 1);
    assert_eq!(progress["per_paper_status"]["./data/in/c1/a.pdf"], "failed");
    assert_eq!(
        progress["per_paper_status"]["./data/in/c1/z.pdf"],
        "processed"
    );
}

// ============================================================================
// Survey Build
// ============================================================================

fn survey_input() -> SurveyBuildInput {
    SurveyBuildInput {
        survey_run_id: "run1".to_string(),
        corpus_id: "c1".to_string(),
        topics: vec!["graph neural networks".to_string()],
        embed_providers: 1,
        llm_providers: 1,
        cooldown_seconds: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_survey_build_happy_path() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.search_results.lock().unwrap() = vec![
        retrieved("p1", "ck1", "Paper One"),
        retrieved("p2", "ck2", "Paper Two"),
    ];
    let acts = surface(&mock);

    let handle = host
        .start("survey-run1", KIND_SURVEY_BUILD, move |ctx| async move {
            survey_build_workflow(&ctx, &acts, survey_input()).await
        })
        .await
        .unwrap();
    let out_path = handle.result().await.unwrap();
    assert!(out_path.ends_with("report.tex"));

    // One retrieval edge per retrieved chunk.
    assert_eq!(mock.topic_edges.lock().unwrap().len(), 2);

    let reports = mock.reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report.matches("\\section{Related Work}").count(), 1);
    assert!(reports[0].report.contains("\\section*{Source Papers}"));

    let run_updates = mock.survey_updates.lock().unwrap().clone();
    assert_eq!(run_updates.first().unwrap().status, "running");
    let last = run_updates.last().unwrap();
    assert_eq!(last.status, "completed");
    assert_eq!(last.out_path, out_path);

    let progress = host.query("survey-run1").unwrap();
    assert_eq!(progress["done_topics"], 1);
    assert_eq!(progress["topic_status"]["graph neural networks"], "done");
}

#[tokio::test]
async fn test_survey_context_overflow_halves_window_once() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.search_results.lock().unwrap() = vec![
        retrieved("p1", "ck1", "Paper One"),
        retrieved("p2", "ck2", "Paper Two"),
        retrieved("p3", "ck3", "Paper Three"),
        retrieved("p4", "ck4", "Paper Four"),
    ];
    mock.generate_script
        .lock()
        .unwrap()
        .push_back(Err("this model's maximum context length is exceeded; prompt too long".to_string()));
    let acts = surface(&mock);

    let handle = host
        .start("survey-ctx", KIND_SURVEY_BUILD, move |ctx| async move {
            survey_build_workflow(&ctx, &acts, survey_input()).await
        })
        .await
        .unwrap();
    handle.result().await.unwrap();

    let calls = mock.generate_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].context.len(), 4);
    assert_eq!(calls[1].context.len(), 2);

    // The successful second draft made it into the report.
    let reports = mock.reports.lock().unwrap().clone();
    assert!(reports[0].report.contains("Synthesized findings"));
    assert!(!reports[0].report.contains("Generation Note"));
}

#[tokio::test]
async fn test_survey_degrades_to_skeleton_when_generation_fails() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.search_results.lock().unwrap() = vec![retrieved("p1", "ck1", "Paper One")];
    mock.generate_script
        .lock()
        .unwrap()
        .push_back(Err("model exploded".to_string()));
    let acts = surface(&mock);

    let handle = host
        .start("survey-degraded", KIND_SURVEY_BUILD, move |ctx| async move {
            survey_build_workflow(&ctx, &acts, survey_input()).await
        })
        .await
        .unwrap();
    let out_path = handle.result().await.unwrap();
    assert!(out_path.ends_with("report.tex"));

    let reports = mock.reports.lock().unwrap().clone();
    assert!(reports[0].report.contains("\\section{Related Work}"));
    assert!(reports[0].report.contains("\\section*{Generation Note}"));

    // Still completed: a degraded artifact beats an error.
    assert_eq!(
        mock.survey_updates.lock().unwrap().last().unwrap().status,
        "completed"
    );
}

#[tokio::test]
async fn test_survey_requires_a_topic() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    let acts = surface(&mock);

    let handle = host
        .start("survey-empty", KIND_SURVEY_BUILD, move |ctx| async move {
            let mut input = survey_input();
            input.topics.clear();
            survey_build_workflow(&ctx, &acts, input).await
        })
        .await
        .unwrap();
    let err = handle.result().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Input(_)));
    assert!(mock.survey_updates.lock().unwrap().is_empty());
}

// ============================================================================
// Backfill
// ============================================================================

#[tokio::test]
async fn test_backfill_unknown_mode_is_an_input_error_with_no_side_effects() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    let acts = surface(&mock);

    let handle = host
        .start("backfill-bogus-c1-1", KIND_BACKFILL, move |ctx| async move {
            backfill_workflow(
                &ctx,
                &acts,
                BackfillInput {
                    corpus_id: "c1".to_string(),
                    mode: "DELETE_EVERYTHING".to_string(),
                    ..Default::default()
                },
            )
            .await
        })
        .await
        .unwrap();
    let err = handle.result().await.unwrap_err();
    assert!(err.to_string().contains("unsupported backfill mode"));
    assert!(mock.manifests.lock().unwrap().is_empty());
    assert!(mock.status_updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_backfill_retry_failed_papers() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.papers.lock().unwrap() = vec![
        PaperSummary {
            paper_id: "p-ok".to_string(),
            filename: "ok.pdf".to_string(),
            status: "processed".to_string(),
            ..Default::default()
        },
        PaperSummary {
            paper_id: "p-bad".to_string(),
            filename: "bad.pdf".to_string(),
            status: "failed".to_string(),
            ..Default::default()
        },
    ];
    let acts = surface(&mock);

    let workflow_id = ids::backfill_id("RETRY_FAILED_PAPERS", "c1", 1);
    let handle = host
        .start(&workflow_id, KIND_BACKFILL, move |ctx| async move {
            backfill_workflow(
                &ctx,
                &acts,
                BackfillInput {
                    corpus_id: "c1".to_string(),
                    mode: "retry_failed_papers".to_string(),
                    embed_providers: 1,
                    ..Default::default()
                },
            )
            .await
        })
        .await
        .unwrap();
    let manifest_path = handle.result().await.unwrap();
    assert!(manifest_path.ends_with("manifest.json"));

    let manifests = mock.manifests.lock().unwrap().clone();
    assert_eq!(manifests.len(), 1);
    let (run_id, manifest) = &manifests[0];
    assert_eq!(run_id, &workflow_id);
    assert_eq!(manifest["retried_failed_papers"], 1);
    assert_eq!(manifest["mode"], "retry_failed_papers");
    assert_eq!(manifest["versions"]["chunk"], "v1");
    assert_eq!(manifest["versions"]["embed"], "v1");

    // Only the failed paper was re-processed.
    let processed: Vec<String> = mock
        .status_updates
        .lock()
        .unwrap()
        .iter()
        .map(|u| u.filename.clone())
        .collect();
    assert!(processed.iter().all(|f| f == "bad.pdf"));
}

#[tokio::test]
async fn test_backfill_reembed_all_pins_provider_strictly() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.papers.lock().unwrap() = (0..3)
        .map(|i| PaperSummary {
            paper_id: format!("p{}", i),
            filename: format!("p{}.pdf", i),
            status: "processed".to_string(),
            ..Default::default()
        })
        .collect();
    let acts = surface(&mock);

    let handle = host
        .start("backfill-reembed-c1-1", KIND_BACKFILL, move |ctx| async move {
            backfill_workflow(
                &ctx,
                &acts,
                BackfillInput {
                    corpus_id: "c1".to_string(),
                    mode: "REEMBED_ALL_PAPERS".to_string(),
                    embed_version: "v2".to_string(),
                    embed_providers: 2,
                    preferred_embed_provider_index: Some(1),
                    strict_embed_provider: true,
                    ..Default::default()
                },
            )
            .await
        })
        .await
        .unwrap();
    handle.result().await.unwrap();

    let manifests = mock.manifests.lock().unwrap().clone();
    assert_eq!(manifests[0].1["reembedded_papers"], 3);
    assert_eq!(manifests[0].1["total_papers_seen"], 3);
    assert_eq!(manifests[0].1["versions"]["embed"], "v2");

    // Every embed invocation across all three children carried index 1.
    let indices: Vec<usize> = mock
        .embed_calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.provider_index)
        .collect();
    assert_eq!(indices.len(), 3);
    assert!(indices.iter().all(|&i| i == 1));

    // New-version rows were written for each paper.
    let upserts = mock.chunk_upserts.lock().unwrap().clone();
    assert_eq!(upserts.len(), 3);
    assert!(upserts.iter().all(|u| u.embedding_version == "v2"));
}

// ============================================================================
// KG extraction
// ============================================================================

fn kg_input() -> KgExtractPaperInput {
    KgExtractPaperInput {
        corpus_id: "c1".to_string(),
        paper_id: "p1".to_string(),
        llm_providers: 1,
        cooldown_seconds: 10,
        ..Default::default()
    }
}

const TRIPLES_JSON: &str = r#"{"triples":[
    {"source_type":"method","source_name":"BERT","relation_type":"BASED_ON",
     "target_type":"method","target_name":"Transformer","evidence":"a","confidence":0.9},
    {"source_type":"method","source_name":"bert","relation_type":"based_on",
     "target_type":"method","target_name":"transformer","evidence":"b","confidence":0.4}
]}"#;

#[tokio::test]
async fn test_kg_extract_paper_dedupes_and_completes() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.paper_chunks.lock().unwrap() = PaperChunks {
        title: "BERT Paper".to_string(),
        chunks: vec![PaperChunk {
            chunk_id: "ck1".to_string(),
            text: "BERT is based on Transformer".to_string(),
        }],
    };
    mock.generate_script.lock().unwrap().push_back(Ok(LlmGenerateOutput {
        text: TRIPLES_JSON.to_string(),
        provider_name: "mock".to_string(),
        model: "mock-llm-v1".to_string(),
    }));
    let acts = surface(&mock);

    let handle = host
        .start("kg-paper-c1-p1-1", KIND_KG_EXTRACT_PAPER, move |ctx| async move {
            kg_extract_paper_workflow(&ctx, &acts, kg_input()).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "completed");

    let upserts = mock.kg_upserts.lock().unwrap().clone();
    assert_eq!(upserts.len(), 1);
    // The duplicated 5-tuple collapsed to one triple.
    assert_eq!(upserts[0].triples.len(), 1);
    assert_eq!(upserts[0].triples[0].source_name, "bert");
    assert_eq!(upserts[0].triples[0].chunk_id, "ck1");

    let runs = mock.kg_runs.lock().unwrap().clone();
    assert_eq!(runs.first().unwrap().status, "running");
    let last = runs.last().unwrap();
    assert_eq!(last.status, "completed");
    assert_eq!(last.triple_count, 1);
    // prompt_hash is the sha256 of the prompt version.
    assert_eq!(last.prompt_hash.len(), 64);
}

#[tokio::test]
async fn test_kg_extract_paper_all_chunks_failing_marks_failed_without_upsert() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.paper_chunks.lock().unwrap() = PaperChunks {
        title: "Doomed Paper".to_string(),
        chunks: vec![
            PaperChunk {
                chunk_id: "ck1".to_string(),
                text: "alpha".to_string(),
            },
            PaperChunk {
                chunk_id: "ck2".to_string(),
                text: "beta".to_string(),
            },
        ],
    };
    mock.generate_script
        .lock()
        .unwrap()
        .push_back(Err("malformed model output".to_string()));
    let acts = surface(&mock);

    let handle = host
        .start("kg-paper-c1-doom-1", KIND_KG_EXTRACT_PAPER, move |ctx| async move {
            kg_extract_paper_workflow(&ctx, &acts, kg_input()).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "failed");

    assert!(mock.kg_upserts.lock().unwrap().is_empty());
    let last = mock.kg_runs.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.status, "failed");
    assert_eq!(last.triple_count, 0);
    assert!(last.last_error.contains("exhausted all llm providers"));
}

// ============================================================================
// Runtime (the façade-facing embedding surface)
// ============================================================================

#[tokio::test]
async fn test_runtime_starts_ingest_and_exposes_progress() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.pdfs.lock().unwrap() = vec!["./data/in/c9/a.pdf".to_string()];
    let runtime = quire_workflows::WorkflowRuntime::new(
        host,
        surface(&mock),
        quire_workflows::RuntimeDefaults::default(),
    );

    let handle = runtime
        .start_corpus_ingest("c9", "./data/in/c9")
        .await
        .unwrap();
    assert_eq!(handle.workflow_id(), "ingest-c9");
    assert_eq!(handle.result().await.unwrap(), "completed");

    let progress = runtime.get_progress("ingest-c9").unwrap();
    assert_eq!(progress["total"], 1);
    assert_eq!(progress["done"], 1);
    assert_eq!(
        runtime.status("ingest-c9").await.unwrap(),
        quire_engine::WorkflowStatus::Completed
    );
}

#[tokio::test]
async fn test_runtime_kg_backfill_fans_out_over_papers() {
    let (host, _, _) = test_host();
    let mock = Arc::new(MockSurface::new());
    *mock.papers.lock().unwrap() = vec![
        PaperSummary {
            paper_id: "p1".to_string(),
            filename: "p1.pdf".to_string(),
            status: "processed".to_string(),
            ..Default::default()
        },
        PaperSummary {
            paper_id: "p2".to_string(),
            filename: "p2.pdf".to_string(),
            status: "processed".to_string(),
            ..Default::default()
        },
    ];
    *mock.paper_chunks.lock().unwrap() = PaperChunks {
        title: "T".to_string(),
        chunks: vec![PaperChunk {
            chunk_id: "ck1".to_string(),
            text: "text".to_string(),
        }],
    };
    let runtime = quire_workflows::WorkflowRuntime::new(
        host,
        surface(&mock),
        quire_workflows::RuntimeDefaults::default(),
    );

    let handle = runtime
        .start_kg_backfill(
            KgBackfillInput {
                corpus_id: "c1".to_string(),
                ..Default::default()
            },
            77,
        )
        .await
        .unwrap();
    assert_eq!(handle.workflow_id(), "kg-backfill-c1-77");
    assert_eq!(handle.result().await.unwrap(), "completed");

    let progress = runtime.get_progress("kg-backfill-c1-77").unwrap();
    assert_eq!(progress["total"], 2);
    assert_eq!(progress["done"], 2);
    assert_eq!(progress["failed"], 0);
    // Both papers ended their runs completed (non-JSON model output parses
    // to an empty triple batch, not a failure).
    let runs = mock.kg_runs.lock().unwrap().clone();
    assert_eq!(
        runs.iter().filter(|r| r.status == "completed").count(),
        2
    );
}

// ============================================================================
// Deduplication across restarts
// ============================================================================

#[tokio::test]
async fn test_completed_workflow_is_not_rerun_after_restart() {
    let (host, persistence, clock) = test_host();
    let mock = Arc::new(MockSurface::new());

    let acts = surface(&mock);
    let handle = host
        .start("paper-once", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, paper_input("./data/in/c1/a.pdf")).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "processed");
    assert_eq!(mock.compute_calls.load(Ordering::SeqCst), 1);

    // A new host over the same persistence simulates a worker restart.
    let host2 = quire_engine::WorkflowHost::builder()
        .persistence(persistence)
        .clock(clock)
        .build()
        .unwrap();
    let acts = surface(&mock);
    let handle = host2
        .start("paper-once", KIND_PAPER_PROCESS, move |ctx| async move {
            paper_process_workflow(&ctx, &acts, paper_input("./data/in/c1/a.pdf")).await
        })
        .await
        .unwrap();
    assert_eq!(handle.result().await.unwrap(), "processed");
    // The stored output was reused; no activity re-ran.
    assert_eq!(mock.compute_calls.load(Ordering::SeqCst), 1);
}
