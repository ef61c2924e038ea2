// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! LLM call audit repository (append-only).

use sqlx::PgPool;

use crate::error::StorageError;

/// One provider invocation attempt.
#[derive(Debug, Clone, Default)]
pub struct LlmCallRecord {
    pub operation: String,
    pub corpus_id: String,
    pub paper_id: String,
    pub provider_name: String,
    pub model: String,
    /// Request correlation id, deterministic per (operation, attempt).
    pub request_id: String,
    /// "ok" | "failed"
    pub status: String,
    /// Classified kind when failed.
    pub error_type: String,
}

/// Append-only audit log of provider invocations.
#[derive(Clone)]
pub struct AuditRepo {
    pool: PgPool,
}

impl AuditRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one row.
    pub async fn insert(&self, record: &LlmCallRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO llm_calls (operation, corpus_id, paper_id, provider_name, model, request_id, status, error_type)
            VALUES ($1, NULLIF($2, ''), NULLIF($3, ''), $4, NULLIF($5, ''), $6, $7, NULLIF($8, ''))
            "#,
        )
        .bind(&record.operation)
        .bind(&record.corpus_id)
        .bind(&record.paper_id)
        .bind(&record.provider_name)
        .bind(&record.model)
        .bind(&record.request_id)
        .bind(&record.status)
        .bind(&record.error_type)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("insert llm call", e))?;
        Ok(())
    }
}
