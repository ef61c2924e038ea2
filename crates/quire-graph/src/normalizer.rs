// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Triple normalization.

use crate::types::{EntityType, RawTriple, RelationType, Triple};

/// Canonicalize an entity name: lowercase, underscores and hyphens to
/// spaces, whitespace collapsed.
pub fn canonical_name(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate and normalize a raw triple.
///
/// Returns `None` when a name is empty after canonicalization or a type or
/// relation falls outside the fixed vocabularies. Confidence is clamped to
/// [0, 1].
pub fn normalize_triple(raw: &RawTriple) -> Option<Triple> {
    let source_name = canonical_name(&raw.source_name);
    let target_name = canonical_name(&raw.target_name);
    if source_name.is_empty() || target_name.is_empty() {
        return None;
    }
    let source_type = EntityType::parse(&raw.source_type)?;
    let target_type = EntityType::parse(&raw.target_type)?;
    let relation_type = RelationType::parse(&raw.relation_type)?;
    Some(Triple {
        source_type,
        source_name,
        relation_type,
        target_type,
        target_name,
        evidence: raw.evidence.trim().to_string(),
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("  BERT-Large "), "bert large");
        assert_eq!(canonical_name("ms_marco"), "ms marco");
        assert_eq!(canonical_name("a   b\tc"), "a b c");
        assert_eq!(canonical_name(""), "");
    }

    fn raw(
        source_type: &str,
        source_name: &str,
        relation: &str,
        target_type: &str,
        target_name: &str,
    ) -> RawTriple {
        RawTriple {
            source_type: source_type.to_string(),
            source_name: source_name.to_string(),
            relation_type: relation.to_string(),
            target_type: target_type.to_string(),
            target_name: target_name.to_string(),
            evidence: " BERT is based on Transformer ".to_string(),
            confidence: 0.95,
        }
    }

    #[test]
    fn test_normalize_valid_triple() {
        let triple =
            normalize_triple(&raw("Method", "BERT", "based_on", "method", "Transformer")).unwrap();
        assert_eq!(triple.source_type, EntityType::Method);
        assert_eq!(triple.source_name, "bert");
        assert_eq!(triple.relation_type, RelationType::BasedOn);
        assert_eq!(triple.target_name, "transformer");
        assert_eq!(triple.evidence, "BERT is based on Transformer");
    }

    #[test]
    fn test_normalize_rejects_empty_names() {
        assert!(normalize_triple(&raw("method", "  ", "EXTENDS", "method", "x")).is_none());
        assert!(normalize_triple(&raw("method", "x", "EXTENDS", "method", "")).is_none());
    }

    #[test]
    fn test_normalize_rejects_unknown_vocabulary() {
        assert!(normalize_triple(&raw("galaxy", "a", "EXTENDS", "method", "b")).is_none());
        assert!(normalize_triple(&raw("method", "a", "LIKES", "method", "b")).is_none());
        assert!(normalize_triple(&raw("method", "a", "EXTENDS", "planet", "b")).is_none());
    }

    #[test]
    fn test_normalize_clamps_confidence() {
        let mut r = raw("method", "a", "EXTENDS", "method", "b");
        r.confidence = 1.7;
        assert_eq!(normalize_triple(&r).unwrap().confidence, 1.0);
        r.confidence = -0.2;
        assert_eq!(normalize_triple(&r).unwrap().confidence, 0.0);
    }
}
