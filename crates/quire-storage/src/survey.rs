// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Survey run repository.

use sqlx::PgPool;

use crate::error::StorageError;
use crate::models::SurveyRun;

/// Repository for survey generation runs.
#[derive(Clone)]
pub struct SurveyRepo {
    pool: PgPool,
}

impl SurveyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pending run. Re-creating an existing run id is a no-op.
    pub async fn create_run(
        &self,
        survey_run_id: &str,
        corpus_id: &str,
        topics: &[String],
        questions: &[String],
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO survey_runs (survey_run_id, corpus_id, topics, questions, status)
            VALUES ($1, $2, $3, $4, 'pending')
            ON CONFLICT (survey_run_id) DO NOTHING
            "#,
        )
        .bind(survey_run_id)
        .bind(corpus_id)
        .bind(serde_json::json!(topics))
        .bind(serde_json::json!(questions))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("create survey run", e))?;
        Ok(())
    }

    /// Update run status; an empty out_path leaves the stored path alone.
    pub async fn update_run_status(
        &self,
        survey_run_id: &str,
        status: &str,
        out_path: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE survey_runs
            SET status = $2, out_path = COALESCE(NULLIF($3, ''), out_path)
            WHERE survey_run_id = $1
            "#,
        )
        .bind(survey_run_id)
        .bind(status)
        .bind(out_path)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::db("update survey run", e))?;
        Ok(())
    }

    /// Fetch one run.
    pub async fn get_run(&self, survey_run_id: &str) -> Result<SurveyRun, StorageError> {
        sqlx::query_as::<_, SurveyRun>(
            r#"
            SELECT survey_run_id, corpus_id, status, COALESCE(out_path, '') AS out_path
            FROM survey_runs
            WHERE survey_run_id = $1
            "#,
        )
        .bind(survey_run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::db("get survey run", e))?
        .ok_or_else(|| StorageError::NotFound {
            entity: "survey run",
            key: survey_run_id.to_string(),
        })
    }
}
