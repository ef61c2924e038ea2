// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Survey generation: retrieval + LLM drafting with context-reduction retry.
//!
//! The workflow always produces a useful artifact: when generation fails
//! even after halving the context window, the document degrades to a
//! synthesized skeleton with a generation note instead of erroring.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use quire_activities::ActivitySurface;
use quire_activities::types::{
    EmbedQueryInput, LlmGenerateInput, RetrievedChunk, SearchChunksInput, SurveyPaperMeta,
    SurveyReportInput, SurveyRunUpdate, TopicGraphEdge,
};
use quire_engine::{StepOptions, WorkflowCtx, WorkflowError};
use quire_providers::ErrorKind;

use crate::failover::{
    FailoverError, FailoverParams, ProviderFailover, embed_query_with_failover,
    generate_with_failover,
};
use crate::types::{SurveyBuildInput, SurveyProgress};
use crate::{default_count, default_embed_version, default_seconds};

const DEFAULT_TOP_K: i64 = 14;
const CONTEXT_SNIPPET_MAX: usize = 1400;

/// Build a survey for the given topics. Returns the artifact path.
pub async fn survey_build_workflow(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    input: SurveyBuildInput,
) -> Result<String, WorkflowError> {
    let mut topics: Vec<String> = input
        .topics
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if topics.is_empty() {
        let prompt = input.prompt.trim();
        if !prompt.is_empty() {
            topics.push(prompt.to_string());
        }
    }
    if topics.is_empty() {
        return Err(WorkflowError::Input(
            "survey prompt/topic is required".to_string(),
        ));
    }

    let mut progress = SurveyProgress {
        survey_run_id: input.survey_run_id.clone(),
        corpus_id: input.corpus_id.clone(),
        total_topics: topics.len(),
        ..Default::default()
    };
    ctx.set_progress(&progress);

    mark_run(ctx, acts, "mark-running", &input.survey_run_id, "running", "").await;

    let embed_params = FailoverParams::rotating(
        default_count(input.embed_providers),
        Duration::from_secs(default_seconds(input.cooldown_seconds, 900)),
    );
    let llm_params = FailoverParams::rotating(
        default_count(input.llm_providers),
        Duration::from_secs(default_seconds(input.cooldown_seconds, 900)),
    );
    let top_k = if input.retrieval_top_k <= 0 {
        DEFAULT_TOP_K
    } else {
        input.retrieval_top_k
    };
    let mut embed_state = ProviderFailover::new();
    let mut llm_state = ProviderFailover::new();
    let mut embed_retries = Default::default();
    let mut llm_retries = Default::default();

    let mut all_refs: Vec<SurveyReference> = Vec::new();
    let mut bodies: Vec<String> = Vec::new();
    let mut generation_failed = false;

    for (ti, topic) in topics.iter().enumerate() {
        let label = topic_label(topic);
        progress
            .topic_status
            .insert(label.clone(), "retrieving".to_string());
        ctx.set_progress(&progress);

        let query = embed_query_with_failover(
            ctx,
            acts,
            &mut embed_state,
            &embed_params,
            &format!("topic-{}-embed", ti),
            EmbedQueryInput {
                operation: "survey_topic_embed".to_string(),
                text: topic.clone(),
                provider_index: 0,
            },
            &mut embed_retries,
        )
        .await;
        let query = match query {
            Ok(out) => out,
            Err(err) => {
                progress.topic_status.insert(label, "failed".to_string());
                ctx.set_progress(&progress);
                return Err(err.into());
            }
        };

        let retrieved: Vec<RetrievedChunk> = {
            let acts2 = acts.clone();
            let search = SearchChunksInput {
                corpus_id: input.corpus_id.clone(),
                query_vec: query.vector,
                top_k,
                embedding_version: default_embed_version(&input.embed_version),
            };
            let result = ctx
                .step(
                    &format!("topic-{}-search", ti),
                    StepOptions::default(),
                    move || {
                        let acts = acts2.clone();
                        let search = search.clone();
                        async move { acts.search_chunks(search).await }
                    },
                )
                .await;
            match result {
                Ok(out) => out,
                Err(err) => {
                    progress.topic_status.insert(label, "failed".to_string());
                    ctx.set_progress(&progress);
                    return Err(err.into());
                }
            }
        };

        // Retrieval-derived graph enrichment, best-effort per chunk.
        for (ci, chunk) in retrieved.iter().enumerate() {
            let acts2 = acts.clone();
            let edge = TopicGraphEdge {
                corpus_id: input.corpus_id.clone(),
                topic: topic.clone(),
                paper_id: chunk.paper_id.clone(),
                title: chunk.title.clone(),
                chunk_id: chunk.chunk_id.clone(),
                score: chunk.score,
            };
            let _ = ctx
                .step(
                    &format!("topic-{}-graph-{}", ti, ci),
                    StepOptions::default(),
                    move || {
                        let acts = acts2.clone();
                        let edge = edge.clone();
                        async move { acts.upsert_topic_graph(edge).await }
                    },
                )
                .await;
        }

        progress
            .topic_status
            .insert(label.clone(), "drafting".to_string());
        ctx.set_progress(&progress);

        let (mut refs, context) = build_survey_references(&retrieved, all_refs.len());
        let paper_ids: Vec<String> = refs
            .iter()
            .map(|r| r.paper_id.clone())
            .filter(|id| !id.trim().is_empty())
            .collect();
        if !paper_ids.is_empty() {
            let acts2 = acts.clone();
            let corpus_id = input.corpus_id.clone();
            let meta = ctx
                .step(
                    &format!("topic-{}-paper-meta", ti),
                    StepOptions::default(),
                    move || {
                        let acts = acts2.clone();
                        let corpus_id = corpus_id.clone();
                        let paper_ids = paper_ids.clone();
                        async move { acts.get_survey_paper_meta(&corpus_id, &paper_ids).await }
                    },
                )
                .await;
            if let Ok(meta) = meta {
                enrich_references(&mut refs, &meta);
            }
        }

        let generate_input = LlmGenerateInput {
            operation: "survey_ieee_latex".to_string(),
            corpus_id: input.corpus_id.clone(),
            prompt: build_latex_prompt(topic, &refs),
            context: context.clone(),
            ..Default::default()
        };
        let mut section = generate_with_failover(
            ctx,
            acts,
            &mut llm_state,
            &llm_params,
            &input.llm_provider_refs,
            &format!("topic-{}-generate", ti),
            generate_input.clone(),
            &mut llm_retries,
        )
        .await;

        // Context overflow: halve the window and try exactly once more.
        if matches!(
            section,
            Err(FailoverError::Provider {
                kind: ErrorKind::Context,
                ..
            })
        ) {
            let mut reduced = generate_input.clone();
            reduced.context = context[..context.len() / 2].to_vec();
            section = generate_with_failover(
                ctx,
                acts,
                &mut llm_state,
                &llm_params,
                &input.llm_provider_refs,
                &format!("topic-{}-generate-reduced", ti),
                reduced,
                &mut llm_retries,
            )
            .await;
        }

        match section {
            Ok(out) => {
                let body = clean_llm_document(&out.text);
                if !body.is_empty() {
                    bodies.push(body);
                } else {
                    generation_failed = true;
                }
            }
            Err(FailoverError::Engine(e)) => return Err(e.into()),
            Err(_) => generation_failed = true,
        }

        all_refs.extend(refs);
        progress.topic_status.insert(label, "done".to_string());
        progress.done_topics += 1;
        ctx.set_progress(&progress);
    }

    let body = bodies.join("\n\n");
    let report = build_latex_document(&topics.join("; "), &all_refs, &body, generation_failed);
    let output_format = if input.output_format.trim().is_empty() {
        "latex".to_string()
    } else {
        input.output_format.clone()
    };

    let out_path: String = {
        let acts2 = acts.clone();
        let report_input = SurveyReportInput {
            corpus_id: input.corpus_id.clone(),
            survey_run_id: input.survey_run_id.clone(),
            report,
            output_format,
        };
        ctx.step("write-report", StepOptions::default(), move || {
            let acts = acts2.clone();
            let report_input = report_input.clone();
            async move { acts.write_survey_report(report_input).await }
        })
        .await
        .map_err(WorkflowError::from)?
    };

    mark_run(
        ctx,
        acts,
        "mark-completed",
        &input.survey_run_id,
        "completed",
        &out_path,
    )
    .await;

    info!(survey_run_id = %input.survey_run_id, out_path = %out_path, "survey completed");
    Ok(out_path)
}

async fn mark_run(
    ctx: &WorkflowCtx,
    acts: &Arc<dyn ActivitySurface>,
    key: &str,
    survey_run_id: &str,
    status: &str,
    out_path: &str,
) {
    let acts = acts.clone();
    let update = SurveyRunUpdate {
        survey_run_id: survey_run_id.to_string(),
        status: status.to_string(),
        out_path: out_path.to_string(),
    };
    let _ = ctx
        .step(key, StepOptions::default(), move || {
            let acts = acts.clone();
            let update = update.clone();
            async move { acts.update_survey_run(update).await }
        })
        .await;
}

fn topic_label(topic: &str) -> String {
    let chars: Vec<char> = topic.chars().collect();
    if chars.len() > 64 {
        let mut label: String = chars[..61].iter().collect();
        label.push_str("...");
        label
    } else {
        topic.to_string()
    }
}

/// One cited source in the survey document.
#[derive(Debug, Clone, Default)]
pub(crate) struct SurveyReference {
    pub key: String,
    pub paper_id: String,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub filename: String,
    pub chunk_ids: Vec<String>,
}

/// Group retrieved chunks into per-paper references and build the structured
/// context window. `key_offset` keeps reference keys unique across topics.
pub(crate) fn build_survey_references(
    results: &[RetrievedChunk],
    key_offset: usize,
) -> (Vec<SurveyReference>, Vec<String>) {
    let mut refs: Vec<SurveyReference> = Vec::new();
    let mut paper_to_idx = std::collections::HashMap::new();
    let mut context = Vec::with_capacity(results.len());

    for chunk in results {
        let paper_id = if chunk.paper_id.trim().is_empty() {
            chunk.chunk_id.clone()
        } else {
            chunk.paper_id.trim().to_string()
        };
        let idx = *paper_to_idx.entry(paper_id.clone()).or_insert_with(|| {
            let title = chunk.title.trim();
            refs.push(SurveyReference {
                key: format!("ref{}", key_offset + refs.len() + 1),
                paper_id,
                title: if title.is_empty() {
                    "Untitled Source".to_string()
                } else {
                    title.to_string()
                },
                ..Default::default()
            });
            refs.len() - 1
        });
        if !chunk.chunk_id.is_empty() {
            refs[idx].chunk_ids.push(chunk.chunk_id.clone());
        }
        context.push(format!(
            "Source {} | Title: {} | Chunk: {} | Evidence: {}",
            refs[idx].key,
            refs[idx].title,
            chunk.chunk_id,
            latex_sanitize_context(&chunk.text),
        ));
    }
    (refs, context)
}

fn enrich_references(refs: &mut [SurveyReference], meta: &[SurveyPaperMeta]) {
    for reference in refs.iter_mut() {
        let Some(m) = meta.iter().find(|m| m.paper_id == reference.paper_id) else {
            continue;
        };
        if !m.title.trim().is_empty() {
            reference.title = m.title.trim().to_string();
        }
        reference.authors = m.authors.trim().to_string();
        reference.year = m.year;
        reference.filename = m.filename.trim().to_string();
    }
}

pub(crate) fn latex_sanitize_context(s: &str) -> String {
    let joined = s
        .trim()
        .replace(['\n', '\r'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let chars: Vec<char> = joined.chars().collect();
    if chars.len() > CONTEXT_SNIPPET_MAX {
        let mut out: String = chars[..CONTEXT_SNIPPET_MAX].iter().collect();
        out.push_str("...");
        out
    } else {
        joined
    }
}

pub(crate) fn build_latex_prompt(topic: &str, refs: &[SurveyReference]) -> String {
    let ref_lines: Vec<String> = refs
        .iter()
        .map(|r| format!("- {}: {}", r.key, r.title))
        .collect();
    [
        "Write a citation-grounded literature survey in LaTeX body format for this topic:",
        topic,
        "",
        "Output requirements:",
        "1. Output ONLY LaTeX content for the body (no \\documentclass, no bibliography environment, no code fences).",
        "2. Include exactly one \\section{Related Work}; do not create one section per individual paper.",
        "3. The Related Work section must synthesize papers thematically and compare methods/findings.",
        "4. Use inline citation keys like [ref1], [ref2] directly in text (do not use \\cite).",
        "5. Every source key listed below must appear at least once in the Related Work section.",
        "6. Every factual claim must cite one or more listed keys; do not cite any key outside this list.",
        "7. Do not include a bibliography or references section.",
        "8. If evidence is weak, explicitly state limitations.",
        "",
        "Allowed citation keys:",
        &ref_lines.join("\n"),
    ]
    .join("\n")
}

pub(crate) fn clean_llm_document(s: &str) -> String {
    let mut s = s.trim();
    for prefix in ["```latex", "```tex", "```"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    s = s.strip_suffix("```").unwrap_or(s);
    let mut s = s.trim();
    if let Some((_, after)) = s.split_once("\\begin{document}") {
        s = after;
    }
    if let Some((before, _)) = s.split_once("\\end{document}") {
        s = before;
    }
    s.trim().to_string()
}

pub(crate) fn has_related_work_section(body: &str) -> bool {
    body.to_lowercase().contains("\\section{related work}")
}

fn inline_ref_mentions(refs: &[SurveyReference]) -> String {
    if refs.is_empty() {
        return "the retrieved sources".to_string();
    }
    refs.iter()
        .map(|r| format!("[{}]", r.key))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn latex_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.trim().chars() {
        match ch {
            '\\' => out.push_str("\\textbackslash{}"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '$' => out.push_str("\\$"),
            '&' => out.push_str("\\&"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '%' => out.push_str("\\%"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(ch),
        }
    }
    out
}

/// Assemble the final document around the generated body, guaranteeing
/// exactly one Related Work section and a source list.
pub(crate) fn build_latex_document(
    topic: &str,
    refs: &[SurveyReference],
    body: &str,
    generation_failed: bool,
) -> String {
    let mut out = String::new();
    out.push_str("\\documentclass[conference]{IEEEtran}\n");
    out.push_str("\\usepackage[hidelinks]{hyperref}\n\n");
    out.push_str(&format!("\\title{{Literature Survey: {}}}\n", latex_escape(topic)));
    out.push_str("\\author{Quire Automated Draft}\n\n");
    out.push_str("\\begin{document}\n");
    out.push_str("\\maketitle\n\n");

    if body.trim().is_empty() {
        out.push_str("\\begin{abstract}\n");
        out.push_str(
            "This draft was generated from retrieved evidence but requires manual completion due to limited model output.\n",
        );
        out.push_str("\\end{abstract}\n\n");
        out.push_str("\\section{Related Work}\n");
        out.push_str(
            "This section summarizes the retrieved conference literature for the topic and requires manual expansion.\n",
        );
        out.push_str(&format!(
            "The current evidence pool includes {}.\n\n",
            inline_ref_mentions(refs)
        ));
    } else {
        if !has_related_work_section(body) {
            out.push_str("\\section{Related Work}\n");
            out.push_str(
                "This section synthesizes the retrieved conference literature for the topic. ",
            );
            out.push_str(&format!(
                "Core references considered in this synthesis include {}.\n\n",
                inline_ref_mentions(refs)
            ));
        }
        out.push_str(body);
        out.push_str("\n\n");
    }

    if generation_failed {
        out.push_str("\\section*{Generation Note}\n");
        out.push_str("Model generation encountered an issue; review and expand this draft manually.\n\n");
    }

    out.push_str("\\section*{Source Papers}\n");
    out.push_str("\\begin{itemize}\n");
    for reference in refs {
        let title = latex_escape(reference.title.trim());
        let title = if title.is_empty() {
            "Untitled paper".to_string()
        } else {
            title
        };
        out.push_str(&format!(
            "\\item [{}] {}\n",
            latex_escape(&reference.key),
            title
        ));
    }
    out.push_str("\\end{itemize}\n\n");
    out.push_str("\\end{document}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(paper_id: &str, chunk_id: &str, title: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            paper_id: paper_id.to_string(),
            chunk_id: chunk_id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            score: 0.9,
            snippet: String::new(),
        }
    }

    #[test]
    fn test_references_dedupe_by_paper() {
        let results = vec![
            chunk("p1", "c1", "Paper One", "alpha"),
            chunk("p1", "c2", "Paper One", "beta"),
            chunk("p2", "c3", "Paper Two", "gamma"),
        ];
        let (refs, context) = build_survey_references(&results, 0);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].key, "ref1");
        assert_eq!(refs[0].chunk_ids, vec!["c1", "c2"]);
        assert_eq!(refs[1].key, "ref2");
        assert_eq!(context.len(), 3);
        assert!(context[0].starts_with("Source ref1 | Title: Paper One | Chunk: c1"));
    }

    #[test]
    fn test_references_key_offset_spans_topics() {
        let (refs, _) = build_survey_references(&[chunk("p9", "c9", "Nine", "x")], 4);
        assert_eq!(refs[0].key, "ref5");
    }

    #[test]
    fn test_references_fall_back_to_chunk_identity() {
        let (refs, _) = build_survey_references(&[chunk("", "c1", "", "x")], 0);
        assert_eq!(refs[0].paper_id, "c1");
        assert_eq!(refs[0].title, "Untitled Source");
    }

    #[test]
    fn test_latex_sanitize_context_collapses_and_truncates() {
        assert_eq!(latex_sanitize_context("a\nb\r\nc   d"), "a b c d");
        let long = "x".repeat(2000);
        let out = latex_sanitize_context(&long);
        assert_eq!(out.chars().count(), CONTEXT_SNIPPET_MAX + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_latex_escape_special_characters() {
        assert_eq!(latex_escape("a_b"), "a\\_b");
        assert_eq!(latex_escape("50%"), "50\\%");
        assert_eq!(latex_escape("a\\b"), "a\\textbackslash{}b");
        assert_eq!(latex_escape("{x}"), "\\{x\\}");
    }

    #[test]
    fn test_clean_llm_document_strips_fences_and_preamble() {
        let raw = "```latex\n\\documentclass{article}\n\\begin{document}\n\\section{Related Work}\nBody.\n\\end{document}\n```";
        assert_eq!(clean_llm_document(raw), "\\section{Related Work}\nBody.");
        assert_eq!(clean_llm_document("  plain body  "), "plain body");
    }

    #[test]
    fn test_document_synthesizes_related_work_when_missing() {
        let refs = vec![SurveyReference {
            key: "ref1".to_string(),
            title: "Paper One".to_string(),
            ..Default::default()
        }];
        let doc = build_latex_document("topic", &refs, "\\section{Methods}\nText.", false);
        assert_eq!(doc.matches("\\section{Related Work}").count(), 1);
        assert!(doc.contains("[ref1]"));
        assert!(doc.contains("\\section{Methods}"));
    }

    #[test]
    fn test_document_keeps_single_related_work_from_body() {
        let doc = build_latex_document("t", &[], "\\section{Related Work}\nGood body.", false);
        assert_eq!(doc.matches("\\section{Related Work}").count(), 1);
    }

    #[test]
    fn test_document_skeleton_and_generation_note() {
        let doc = build_latex_document("t", &[], "", true);
        assert!(doc.contains("\\section{Related Work}"));
        assert!(doc.contains("\\section*{Generation Note}"));
        assert!(doc.contains("requires manual completion"));
        assert!(doc.contains("the retrieved sources"));
    }

    #[test]
    fn test_topic_label_truncates() {
        let long = "t".repeat(80);
        let label = topic_label(&long);
        assert_eq!(label.chars().count(), 64);
        assert!(label.ends_with("..."));
        assert_eq!(topic_label("short"), "short");
    }
}
