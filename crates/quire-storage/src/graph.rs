// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Knowledge-graph repository.
//!
//! Nodes and edges are keyed deterministically from corpus + canonical
//! names, so re-running an extraction converges instead of duplicating.
//! Edge payloads carry an append-only provenance array; `support_count` is
//! recomputed as the provenance length on every merge.

use serde_json::{Value, json};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorageError;
use crate::models::{GraphEdge, GraphNode};

/// One extracted triple heading into the graph tables.
#[derive(Debug, Clone)]
pub struct KgTripleRow {
    pub corpus_id: String,
    pub paper_id: String,
    pub prompt_hash: String,
    pub model_version: String,
    pub source_type: String,
    pub source_name: String,
    pub relation_type: String,
    pub target_type: String,
    pub target_name: String,
    pub chunk_id: String,
    pub evidence: String,
    pub confidence: f64,
}

/// Extraction run state, keyed by (corpus, paper, prompt_hash, model_version).
#[derive(Debug, Clone, Default)]
pub struct KgRunRecord {
    pub corpus_id: String,
    pub paper_id: String,
    pub prompt_hash: String,
    pub model_version: String,
    /// running | completed | failed
    pub status: String,
    pub triple_count: i32,
    pub last_error: String,
}

/// One edge of a method lineage traversal.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct LineageEdge {
    pub source_id: String,
    pub source_name: String,
    pub target_id: String,
    pub target_name: String,
    pub edge_type: String,
    pub depth: i32,
}

/// Repository for graph nodes and edges.
#[derive(Clone)]
pub struct GraphRepo {
    pool: PgPool,
}

impl GraphRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record that a chunk of `paper_id` was retrieved for `topic`.
    ///
    /// Upserts a topic node, a paper node, and a `retrieved_for_topic` edge
    /// whose weight is the best similarity score seen so far.
    pub async fn upsert_topic_retrieval(
        &self,
        corpus_id: &str,
        topic: &str,
        paper_id: &str,
        title: &str,
        score: f64,
        chunk_id: &str,
    ) -> Result<(), StorageError> {
        let topic_node_id = format!("topic:{}:{}", corpus_id, topic);
        let paper_node_id = format!("paper:{}", paper_id);
        let edge_id = format!(
            "edge:{}:{}:{}:retrieved_for_topic",
            corpus_id, paper_node_id, topic_node_id
        );

        sqlx::query(
            r#"
            INSERT INTO graph_nodes (node_id, corpus_id, node_type, label, payload)
            VALUES ($1, $2, 'topic', $3, '{}'::jsonb)
            ON CONFLICT (node_id) DO UPDATE SET label = EXCLUDED.label
            "#,
        )
        .bind(&topic_node_id)
        .bind(corpus_id)
        .bind(topic)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("upsert topic node", e))?;

        sqlx::query(
            r#"
            INSERT INTO graph_nodes (node_id, corpus_id, node_type, label, payload)
            VALUES ($1, $2, 'paper', $3, jsonb_build_object('paper_id', $4::text))
            ON CONFLICT (node_id) DO UPDATE SET label = EXCLUDED.label
            "#,
        )
        .bind(&paper_node_id)
        .bind(corpus_id)
        .bind(title)
        .bind(paper_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("upsert paper node", e))?;

        sqlx::query(
            r#"
            INSERT INTO graph_edges (edge_id, corpus_id, source_node_id, target_node_id, edge_type, weight, payload)
            VALUES ($1, $2, $3, $4, 'retrieved_for_topic', $5, jsonb_build_object('chunk_id', $6::text))
            ON CONFLICT (corpus_id, source_node_id, target_node_id, edge_type)
            DO UPDATE SET
              weight = GREATEST(graph_edges.weight, EXCLUDED.weight),
              payload = EXCLUDED.payload
            "#,
        )
        .bind(&edge_id)
        .bind(corpus_id)
        .bind(&paper_node_id)
        .bind(&topic_node_id)
        .bind(score)
        .bind(chunk_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("upsert topic edge", e))?;

        Ok(())
    }

    /// Upsert one extraction batch.
    ///
    /// Node alias sets merge; edge provenance appends; uniqueness on
    /// `(corpus, source, target, relation)` makes re-runs converge.
    pub async fn upsert_kg_triples(&self, triples: &[KgTripleRow]) -> Result<(), StorageError> {
        if triples.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::db("begin kg triples tx", e))?;

        for t in triples {
            let src_node_id = format!(
                "{}:{}:{}",
                t.source_type.to_lowercase(),
                t.corpus_id,
                slug(&t.source_name)
            );
            let dst_node_id = format!(
                "{}:{}:{}",
                t.target_type.to_lowercase(),
                t.corpus_id,
                slug(&t.target_name)
            );
            let edge_id = format!(
                "edge:{}:{}:{}:{}",
                t.corpus_id,
                src_node_id,
                dst_node_id,
                t.relation_type.to_uppercase()
            );

            upsert_entity_node(&mut tx, &src_node_id, t, &t.source_type, &t.source_name).await?;
            upsert_entity_node(&mut tx, &dst_node_id, t, &t.target_type, &t.target_name).await?;
            merge_edge(&mut tx, &edge_id, &src_node_id, &dst_node_id, t).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::db("commit kg triples tx", e))?;
        Ok(())
    }

    /// Upsert the run-state row for one (paper, prompt, model) extraction.
    pub async fn upsert_kg_run(&self, record: &KgRunRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO kg_paper_runs (corpus_id, paper_id, prompt_hash, model_version, status, triple_count, last_error, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NULLIF($7, ''), NOW())
            ON CONFLICT (corpus_id, paper_id, prompt_hash, model_version)
            DO UPDATE SET
              status = EXCLUDED.status,
              triple_count = EXCLUDED.triple_count,
              last_error = EXCLUDED.last_error,
              updated_at = NOW()
            "#,
        )
        .bind(&record.corpus_id)
        .bind(&record.paper_id)
        .bind(&record.prompt_hash)
        .bind(&record.model_version)
        .bind(&record.status)
        .bind(record.triple_count)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("upsert kg run", e))?;
        Ok(())
    }

    /// All nodes and edges of a corpus.
    pub async fn get_graph(
        &self,
        corpus_id: &str,
    ) -> Result<(Vec<GraphNode>, Vec<GraphEdge>), StorageError> {
        let nodes = sqlx::query_as::<_, GraphNode>(
            "SELECT node_id, node_type, label, payload FROM graph_nodes WHERE corpus_id = $1",
        )
        .bind(corpus_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::db("query graph nodes", e))?;

        let edges = sqlx::query_as::<_, GraphEdge>(
            r#"
            SELECT edge_id, source_node_id, target_node_id, edge_type, weight, payload
            FROM graph_edges
            WHERE corpus_id = $1
            "#,
        )
        .bind(corpus_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::db("query graph edges", e))?;

        Ok((nodes, edges))
    }

    /// Ancestry of a method through EXTENDS/BASED_ON edges, depth-capped.
    ///
    /// The graph is cyclic in general (methods extend methods); traversal is
    /// a recursive query over edge rows, never in-memory references.
    pub async fn method_lineage(
        &self,
        corpus_id: &str,
        method: &str,
    ) -> Result<Vec<LineageEdge>, StorageError> {
        let root = format!("method:{}:{}", corpus_id, slug(method));
        sqlx::query_as::<_, LineageEdge>(
            r#"
            WITH RECURSIVE lineage AS (
              SELECT e.source_node_id, e.target_node_id, e.edge_type, 1 AS depth
              FROM graph_edges e
              WHERE e.corpus_id = $1
                AND e.target_node_id = $2
                AND e.edge_type IN ('EXTENDS', 'BASED_ON')
              UNION ALL
              SELECT e.source_node_id, e.target_node_id, e.edge_type, l.depth + 1
              FROM graph_edges e
              JOIN lineage l ON e.target_node_id = l.source_node_id
              WHERE e.corpus_id = $1
                AND e.edge_type IN ('EXTENDS', 'BASED_ON')
                AND l.depth < 8
            )
            SELECT l.source_node_id AS source_id, ns.label AS source_name,
                   l.target_node_id AS target_id, nt.label AS target_name,
                   l.edge_type, l.depth
            FROM lineage l
            JOIN graph_nodes ns ON ns.node_id = l.source_node_id
            JOIN graph_nodes nt ON nt.node_id = l.target_node_id
            ORDER BY l.depth ASC
            "#,
        )
        .bind(corpus_id)
        .bind(&root)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::db("query lineage", e))
    }
}

async fn upsert_entity_node(
    tx: &mut Transaction<'_, Postgres>,
    node_id: &str,
    t: &KgTripleRow,
    node_type: &str,
    name: &str,
) -> Result<(), StorageError> {
    let existing: Option<(Value,)> =
        sqlx::query_as("SELECT payload FROM graph_nodes WHERE node_id = $1 FOR UPDATE")
            .bind(node_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| StorageError::db("lock graph node", e))?;

    let mut aliases: Vec<String> = existing
        .as_ref()
        .and_then(|(payload,)| payload.get("aliases"))
        .and_then(|a| serde_json::from_value(a.clone()).ok())
        .unwrap_or_default();
    if !aliases.iter().any(|a| a == name) {
        aliases.push(name.to_string());
    }
    let payload = json!({ "canonical_name": name, "aliases": aliases });

    sqlx::query(
        r#"
        INSERT INTO graph_nodes (node_id, corpus_id, node_type, label, payload)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (node_id) DO UPDATE SET payload = EXCLUDED.payload
        "#,
    )
    .bind(node_id)
    .bind(&t.corpus_id)
    .bind(node_type.to_lowercase())
    .bind(name)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| StorageError::db("upsert entity node", e))?;
    Ok(())
}

async fn merge_edge(
    tx: &mut Transaction<'_, Postgres>,
    edge_id: &str,
    src_node_id: &str,
    dst_node_id: &str,
    t: &KgTripleRow,
) -> Result<(), StorageError> {
    let existing: Option<(Value, f64)> = sqlx::query_as(
        r#"
        SELECT payload, weight FROM graph_edges
        WHERE corpus_id = $1 AND source_node_id = $2 AND target_node_id = $3 AND edge_type = $4
        FOR UPDATE
        "#,
    )
    .bind(&t.corpus_id)
    .bind(src_node_id)
    .bind(dst_node_id)
    .bind(t.relation_type.to_uppercase())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| StorageError::db("lock graph edge", e))?;

    let mut provenance: Vec<Value> = existing
        .as_ref()
        .and_then(|(payload, _)| payload.get("provenance"))
        .and_then(|p| serde_json::from_value(p.clone()).ok())
        .unwrap_or_default();
    provenance.push(json!({
        "paper_id": t.paper_id,
        "chunk_id": t.chunk_id,
        "evidence": t.evidence,
        "confidence": t.confidence,
        "prompt_hash": t.prompt_hash,
        "model_version": t.model_version,
    }));
    let weight = existing
        .as_ref()
        .map(|(_, w)| w.max(t.confidence))
        .unwrap_or(t.confidence);
    let payload = json!({
        "support_count": provenance.len(),
        "provenance": provenance,
        "model_version": t.model_version,
        "prompt_hash": t.prompt_hash,
    });

    sqlx::query(
        r#"
        INSERT INTO graph_edges (edge_id, corpus_id, source_node_id, target_node_id, edge_type, weight, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (corpus_id, source_node_id, target_node_id, edge_type)
        DO UPDATE SET weight = EXCLUDED.weight, payload = EXCLUDED.payload
        "#,
    )
    .bind(edge_id)
    .bind(&t.corpus_id)
    .bind(src_node_id)
    .bind(dst_node_id)
    .bind(t.relation_type.to_uppercase())
    .bind(weight)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| StorageError::db("upsert kg edge", e))?;
    Ok(())
}

/// Slug used inside node ids: lowercase, separators unified, spaces to
/// underscores.
pub(crate) fn slug(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}
