// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Paper repository.

use sqlx::PgPool;

use crate::error::StorageError;
use crate::models::Paper;

const PAPER_COLUMNS: &str = r#"
paper_id, corpus_id, filename, COALESCE(title, '') AS title,
COALESCE(authors, '') AS authors, year, COALESCE(abstract, '') AS abstract_text,
status, COALESCE(fail_reason, '') AS fail_reason, created_at, updated_at
"#;

/// Fields for an upsert; empty strings mean "keep whatever is stored".
#[derive(Debug, Clone, Default)]
pub struct PaperUpsert {
    pub paper_id: String,
    pub corpus_id: String,
    pub filename: String,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub abstract_text: String,
    pub status: String,
    pub fail_reason: String,
}

/// Repository for paper rows.
#[derive(Clone)]
pub struct PaperRepo {
    pool: PgPool,
}

impl PaperRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by the content-addressed paper id.
    ///
    /// Empty incoming title/authors/abstract never clobber stored values;
    /// status and fail_reason are always replaced.
    pub async fn upsert_paper(&self, p: &PaperUpsert) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO papers (paper_id, corpus_id, filename, title, authors, year, abstract, status, fail_reason, updated_at)
            VALUES ($1, $2, $3, NULLIF($4, ''), NULLIF($5, ''), $6, NULLIF($7, ''), $8, NULLIF($9, ''), NOW())
            ON CONFLICT (paper_id)
            DO UPDATE SET
              corpus_id = EXCLUDED.corpus_id,
              filename = EXCLUDED.filename,
              title = COALESCE(EXCLUDED.title, papers.title),
              authors = COALESCE(EXCLUDED.authors, papers.authors),
              year = COALESCE(EXCLUDED.year, papers.year),
              abstract = COALESCE(EXCLUDED.abstract, papers.abstract),
              status = EXCLUDED.status,
              fail_reason = EXCLUDED.fail_reason,
              updated_at = NOW()
            "#,
        )
        .bind(&p.paper_id)
        .bind(&p.corpus_id)
        .bind(&p.filename)
        .bind(&p.title)
        .bind(&p.authors)
        .bind(p.year)
        .bind(&p.abstract_text)
        .bind(&p.status)
        .bind(&p.fail_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("upsert paper", e))?;
        Ok(())
    }

    /// All papers in a corpus, newest first.
    pub async fn list_papers_by_corpus(&self, corpus_id: &str) -> Result<Vec<Paper>, StorageError> {
        let query = format!(
            "SELECT {PAPER_COLUMNS} FROM papers WHERE corpus_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Paper>(&query)
            .bind(corpus_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::db("list papers", e))
    }

    /// Papers with status 'failed', most recently updated first.
    pub async fn list_failed_papers(&self, corpus_id: &str) -> Result<Vec<Paper>, StorageError> {
        let query = format!(
            "SELECT {PAPER_COLUMNS} FROM papers WHERE corpus_id = $1 AND status = 'failed' ORDER BY updated_at DESC"
        );
        sqlx::query_as::<_, Paper>(&query)
            .bind(corpus_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::db("list failed papers", e))
    }

    /// One paper by corpus and id.
    pub async fn get_paper(&self, corpus_id: &str, paper_id: &str) -> Result<Paper, StorageError> {
        let query =
            format!("SELECT {PAPER_COLUMNS} FROM papers WHERE corpus_id = $1 AND paper_id = $2");
        sqlx::query_as::<_, Paper>(&query)
            .bind(corpus_id)
            .bind(paper_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::db("get paper", e))?
            .ok_or_else(|| StorageError::NotFound {
                entity: "paper",
                key: format!("{}/{}", corpus_id, paper_id),
            })
    }

    /// Papers by id set, newest first.
    pub async fn list_papers_by_ids(
        &self,
        corpus_id: &str,
        paper_ids: &[String],
    ) -> Result<Vec<Paper>, StorageError> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {PAPER_COLUMNS} FROM papers WHERE corpus_id = $1 AND paper_id = ANY($2) ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Paper>(&query)
            .bind(corpus_id)
            .bind(paper_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::db("list papers by ids", e))
    }
}
