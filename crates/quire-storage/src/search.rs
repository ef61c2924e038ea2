// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vector similarity search over chunks.

use sqlx::PgPool;

use crate::error::StorageError;
use crate::models::ChunkSearchResult;

/// Optional search filters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to these papers.
    pub paper_ids: Vec<String>,
    /// Restrict to one retrieval contract. Empty means no filter.
    pub embedding_version: String,
}

/// Cosine-similarity searcher over the chunks table.
#[derive(Clone)]
pub struct Searcher {
    pool: PgPool,
}

impl Searcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Top-K chunks of a corpus by cosine similarity to the query vector.
    ///
    /// Rows without a vector are never candidates; the embedding-version
    /// filter is the retrieval contract.
    pub async fn search_chunks(
        &self,
        corpus_id: &str,
        query_vec: &[f32],
        top_k: i64,
        filters: &SearchFilters,
    ) -> Result<Vec<ChunkSearchResult>, StorageError> {
        let top_k = if top_k <= 0 { 8 } else { top_k };
        let vec_literal = to_literal(query_vec);

        let mut filter_sql = String::new();
        if !filters.paper_ids.is_empty() {
            filter_sql.push_str(" AND c.paper_id = ANY($4)");
        }
        if !filters.embedding_version.trim().is_empty() {
            if filters.paper_ids.is_empty() {
                filter_sql.push_str(" AND c.embedding_version = $4");
            } else {
                filter_sql.push_str(" AND c.embedding_version = $5");
            }
        }

        let query = format!(
            r#"
            SELECT c.paper_id,
                   COALESCE(p.title, p.filename) AS title,
                   p.filename,
                   c.chunk_id,
                   LEFT(c.text, 420) AS snippet,
                   1 - (c.embedding <=> $2::vector) AS score,
                   c.text AS chunk_text
            FROM chunks c
            JOIN papers p ON p.paper_id = c.paper_id
            WHERE c.corpus_id = $1
              AND c.embedding IS NOT NULL{filter_sql}
            ORDER BY c.embedding <=> $2::vector
            LIMIT $3
            "#
        );

        let mut q = sqlx::query_as::<_, ChunkSearchResult>(&query)
            .bind(corpus_id)
            .bind(&vec_literal)
            .bind(top_k);
        if !filters.paper_ids.is_empty() {
            q = q.bind(&filters.paper_ids);
        }
        if !filters.embedding_version.trim().is_empty() {
            q = q.bind(&filters.embedding_version);
        }

        q.fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::db("query vector search", e))
    }
}

/// Encode a vector as a pgvector text literal.
pub fn to_literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{:.6}", x)).collect();
    format!("[{}]", parts.join(","))
}
