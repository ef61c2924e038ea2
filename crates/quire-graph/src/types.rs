// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Triple types and the fixed entity/relation vocabularies.

use serde::{Deserialize, Serialize};

/// Entity vocabulary for graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Paper,
    Author,
    Method,
    Dataset,
    Task,
    Metric,
    Organization,
}

impl EntityType {
    /// Stable lowercase string form (node type column, node id prefixes).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Author => "author",
            Self::Method => "method",
            Self::Dataset => "dataset",
            Self::Task => "task",
            Self::Metric => "metric",
            Self::Organization => "organization",
        }
    }

    /// Parse a lowercase/any-case entity type.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Some(Self::Paper),
            "author" => Some(Self::Author),
            "method" => Some(Self::Method),
            "dataset" => Some(Self::Dataset),
            "task" => Some(Self::Task),
            "metric" => Some(Self::Metric),
            "organization" => Some(Self::Organization),
            _ => None,
        }
    }
}

/// Relation vocabulary for graph edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    Cites,
    Proposes,
    BasedOn,
    Extends,
    Outperforms,
    EvaluatedOn,
    AuthoredBy,
    Implements,
    UsesDataset,
}

impl RelationType {
    /// Stable uppercase string form (edge type column).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cites => "CITES",
            Self::Proposes => "PROPOSES",
            Self::BasedOn => "BASED_ON",
            Self::Extends => "EXTENDS",
            Self::Outperforms => "OUTPERFORMS",
            Self::EvaluatedOn => "EVALUATED_ON",
            Self::AuthoredBy => "AUTHORED_BY",
            Self::Implements => "IMPLEMENTS",
            Self::UsesDataset => "USES_DATASET",
        }
    }

    /// Parse an uppercase/any-case relation type.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CITES" => Some(Self::Cites),
            "PROPOSES" => Some(Self::Proposes),
            "BASED_ON" => Some(Self::BasedOn),
            "EXTENDS" => Some(Self::Extends),
            "OUTPERFORMS" => Some(Self::Outperforms),
            "EVALUATED_ON" => Some(Self::EvaluatedOn),
            "AUTHORED_BY" => Some(Self::AuthoredBy),
            "IMPLEMENTS" => Some(Self::Implements),
            "USES_DATASET" => Some(Self::UsesDataset),
            _ => None,
        }
    }
}

/// A triple as emitted by the model, before normalization. All fields are
/// free-form strings; [`crate::normalize_triple`] validates them against the
/// vocabularies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTriple {
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub relation_type: String,
    #[serde(default)]
    pub target_type: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub confidence: f64,
}

/// A normalized knowledge-graph triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub source_type: EntityType,
    pub source_name: String,
    pub relation_type: RelationType,
    pub target_type: EntityType,
    pub target_name: String,
    /// Short evidence span from the chunk text.
    pub evidence: String,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
}

impl Triple {
    /// Dedup key: the 5-tuple identity of a triple within a batch.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.source_type.as_str(),
            self.source_name,
            self.relation_type.as_str(),
            self.target_type.as_str(),
            self.target_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip() {
        for (s, t) in [
            ("paper", EntityType::Paper),
            ("method", EntityType::Method),
            ("organization", EntityType::Organization),
        ] {
            assert_eq!(EntityType::parse(s), Some(t));
            assert_eq!(t.as_str(), s);
        }
        assert_eq!(EntityType::parse("  Method "), Some(EntityType::Method));
        assert_eq!(EntityType::parse("galaxy"), None);
    }

    #[test]
    fn test_relation_type_round_trip() {
        for (s, t) in [
            ("BASED_ON", RelationType::BasedOn),
            ("EVALUATED_ON", RelationType::EvaluatedOn),
            ("USES_DATASET", RelationType::UsesDataset),
        ] {
            assert_eq!(RelationType::parse(s), Some(t));
            assert_eq!(t.as_str(), s);
        }
        assert_eq!(RelationType::parse("extends"), Some(RelationType::Extends));
        assert_eq!(RelationType::parse("LIKES"), None);
    }

    #[test]
    fn test_serde_wire_forms() {
        let json = serde_json::to_string(&EntityType::Dataset).unwrap();
        assert_eq!(json, "\"dataset\"");
        let json = serde_json::to_string(&RelationType::BasedOn).unwrap();
        assert_eq!(json, "\"BASED_ON\"");
    }

    #[test]
    fn test_dedup_key_shape() {
        let triple = Triple {
            source_type: EntityType::Method,
            source_name: "bert".to_string(),
            relation_type: RelationType::BasedOn,
            target_type: EntityType::Method,
            target_name: "transformer".to_string(),
            evidence: "BERT is based on Transformer".to_string(),
            confidence: 0.95,
        };
        assert_eq!(triple.dedup_key(), "method|bert|BASED_ON|method|transformer");
    }
}
