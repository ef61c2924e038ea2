// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tolerant parsing of the model's triples envelope.

use std::collections::HashSet;

use serde::Deserialize;

use crate::normalizer::normalize_triple;
use crate::types::{RawTriple, Triple};

#[derive(Deserialize)]
struct TriplesEnvelope {
    #[serde(default)]
    triples: Vec<RawTriple>,
}

/// Parse an LLM response into normalized, batch-deduplicated triples.
///
/// Tolerates fenced code blocks around the JSON. Anything unparseable yields
/// an empty batch rather than an error; a model that rambles produces no
/// triples, not a failed workflow.
pub fn parse_triples_json(raw: &str) -> Vec<Triple> {
    let raw = strip_code_fence(raw.trim());
    if raw.is_empty() {
        return Vec::new();
    }
    let Ok(envelope) = serde_json::from_str::<TriplesEnvelope>(raw) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(envelope.triples.len());
    for raw_triple in &envelope.triples {
        let Some(triple) = normalize_triple(raw_triple) else {
            continue;
        };
        if seen.insert(triple.dedup_key()) {
            out.push(triple);
        }
    }
    out
}

fn strip_code_fence(s: &str) -> &str {
    let mut s = s;
    if s.starts_with("```") {
        s = s
            .strip_prefix("```json")
            .or_else(|| s.strip_prefix("```"))
            .unwrap_or(s);
        s = s.strip_suffix("```").unwrap_or(s);
    }
    s.trim()
}
