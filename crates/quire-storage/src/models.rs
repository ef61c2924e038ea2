// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Row models shared across repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A paper row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Paper {
    pub paper_id: String,
    pub corpus_id: String,
    pub filename: String,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub abstract_text: String,
    /// pending | processing | processed | failed
    pub status: String,
    pub fail_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chunk row (without the vector; vectors only travel as literals).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chunk {
    pub chunk_id: String,
    pub paper_id: String,
    pub corpus_id: String,
    pub chunk_index: i32,
    pub text: String,
    pub embedding_version: String,
    pub created_at: DateTime<Utc>,
}

/// One ranked result from vector search.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChunkSearchResult {
    pub paper_id: String,
    pub title: String,
    pub filename: String,
    pub chunk_id: String,
    pub snippet: String,
    pub score: f64,
    pub chunk_text: String,
}

/// A survey generation run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SurveyRun {
    pub survey_run_id: String,
    pub corpus_id: String,
    /// pending | running | completed | failed
    pub status: String,
    pub out_path: String,
}

/// A graph node row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphNode {
    pub node_id: String,
    pub node_type: String,
    pub label: String,
    pub payload: Value,
}

/// A graph edge row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphEdge {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub payload: Value,
}
