// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Extraction prompt construction.

use sha2::{Digest, Sha256};

/// Prompt template for chunk-level triple extraction.
pub const KG_EXTRACTION_PROMPT_TEMPLATE: &str = r#"You are a research knowledge graph extractor.
Extract only explicit relationships from the input text.
Do not infer beyond the text.

Output STRICT JSON with this schema:
{
  "triples": [
    {
      "source_type": "paper|author|method|dataset|task|metric|organization",
      "source_name": "string",
      "relation_type": "CITES|PROPOSES|BASED_ON|EXTENDS|OUTPERFORMS|EVALUATED_ON|AUTHORED_BY|IMPLEMENTS|USES_DATASET",
      "target_type": "paper|author|method|dataset|task|metric|organization",
      "target_name": "string",
      "evidence": "short evidence span from text",
      "confidence": 0.0
    }
  ]
}

Rules:
- Emit at most 12 triples.
- Emit only if the relationship is directly supported by text.
- confidence must be in [0,1].
- Keep evidence short and verbatim-like.
- If no triples, return {"triples":[]}.

Few-shot examples:
Input: "BERT is based on Transformer and evaluated on GLUE."
Output: {"triples":[
{"source_type":"method","source_name":"BERT","relation_type":"BASED_ON","target_type":"method","target_name":"Transformer","evidence":"BERT is based on Transformer","confidence":0.95},
{"source_type":"method","source_name":"BERT","relation_type":"EVALUATED_ON","target_type":"task","target_name":"GLUE","evidence":"evaluated on GLUE","confidence":0.92}
]}

Input: "We compare to GPT-3."
Output: {"triples":[]}
"#;

/// Build the full extraction prompt for one chunk.
pub fn build_chunk_extraction_prompt(paper_title: &str, chunk_text: &str) -> String {
    let title = paper_title.trim();
    let title = if title.is_empty() { "Unknown Paper" } else { title };
    format!(
        "{}\n\nPaper: {}\n\nChunk:\n{}",
        KG_EXTRACTION_PROMPT_TEMPLATE, title, chunk_text
    )
}

/// Hash of the prompt version, part of the KG run identity.
pub fn prompt_hash(prompt_version: &str) -> String {
    let digest = Sha256::digest(prompt_version.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
