// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chunk repository.

use sqlx::PgPool;

use crate::error::StorageError;
use crate::models::Chunk;

/// One chunk to upsert. `embedding` is the pgvector literal (`"[0.1,...]"`);
/// `None` means "keep whatever vector is stored".
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub paper_id: String,
    pub corpus_id: String,
    pub chunk_index: i32,
    pub text: String,
    pub embedding_version: String,
    pub embedding: Option<String>,
}

/// Repository for chunk rows.
#[derive(Clone)]
pub struct ChunkRepo {
    pool: PgPool,
}

impl ChunkRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Transactional upsert keyed by chunk id.
    ///
    /// The vector column is only replaced when a new vector is supplied
    /// (`COALESCE(EXCLUDED.embedding, chunks.embedding)`), so a text-only
    /// rerun never erases embeddings.
    pub async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<(), StorageError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::db("begin tx upsert chunks", e))?;

        for c in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (chunk_id, paper_id, corpus_id, chunk_index, text, embedding_version, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $7::text IS NULL THEN NULL ELSE $7::vector END)
                ON CONFLICT (chunk_id)
                DO UPDATE SET
                  text = EXCLUDED.text,
                  embedding_version = EXCLUDED.embedding_version,
                  embedding = COALESCE(EXCLUDED.embedding, chunks.embedding)
                "#,
            )
            .bind(&c.chunk_id)
            .bind(&c.paper_id)
            .bind(&c.corpus_id)
            .bind(c.chunk_index)
            .bind(&c.text)
            .bind(&c.embedding_version)
            .bind(&c.embedding)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::db(&format!("upsert chunk {}", c.chunk_id), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::db("commit chunks tx", e))?;
        Ok(())
    }

    /// All chunks of one paper, in chunk order.
    pub async fn list_chunks_by_paper(
        &self,
        corpus_id: &str,
        paper_id: &str,
    ) -> Result<Vec<Chunk>, StorageError> {
        sqlx::query_as::<_, Chunk>(
            r#"
            SELECT chunk_id, paper_id, corpus_id, chunk_index, text, embedding_version, created_at
            FROM chunks
            WHERE corpus_id = $1 AND paper_id = $2
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(corpus_id)
        .bind(paper_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::db("list chunks by paper", e))
    }
}
