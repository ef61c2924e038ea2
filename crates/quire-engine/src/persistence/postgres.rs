//! PostgreSQL-backed persistence implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::EngineError;

use super::{CheckpointRecord, EventRecord, InstanceRecord, Persistence};

/// PostgreSQL-backed persistence provider.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres persistence provider from an existing pool.
    ///
    /// Run [`crate::migrations::run_postgres`] against the pool first.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn register_instance(&self, instance_id: &str, kind: &str) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO wf_instances (instance_id, kind, status, created_at)
            VALUES ($1, $2, 'pending', NOW())
            ON CONFLICT (instance_id) DO NOTHING
            "#,
        )
        .bind(instance_id)
        .bind(kind)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, EngineError> {
        let record = sqlx::query_as::<_, InstanceRecord>(
            r#"
            SELECT instance_id, kind, status, created_at, started_at, finished_at, output, error
            FROM wf_instances
            WHERE instance_id = $1
            "#,
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_instance_status(
        &self,
        instance_id: &str,
        status: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            UPDATE wf_instances
            SET status = $2, started_at = COALESCE($3, started_at)
            WHERE instance_id = $1
            "#,
        )
        .bind(instance_id)
        .bind(status)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_instance(
        &self,
        instance_id: &str,
        output: Option<&str>,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let status = if error.is_some() { "failed" } else { "completed" };
        sqlx::query(
            r#"
            UPDATE wf_instances
            SET status = $2, output = $3, error = $4, finished_at = $5
            WHERE instance_id = $1
            "#,
        )
        .bind(instance_id)
        .bind(status)
        .bind(output)
        .bind(error)
        .bind(finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_checkpoint(
        &self,
        instance_id: &str,
        checkpoint_id: &str,
        state: &[u8],
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO wf_checkpoints (instance_id, checkpoint_id, state, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (instance_id, checkpoint_id) DO NOTHING
            "#,
        )
        .bind(instance_id)
        .bind(checkpoint_id)
        .bind(state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_checkpoint(
        &self,
        instance_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<CheckpointRecord>, EngineError> {
        let record = sqlx::query_as::<_, CheckpointRecord>(
            r#"
            SELECT instance_id, checkpoint_id, state, created_at
            FROM wf_checkpoints
            WHERE instance_id = $1 AND checkpoint_id = $2
            "#,
        )
        .bind(instance_id)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_event(&self, event: &EventRecord) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO wf_events (instance_id, event_type, checkpoint_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&event.instance_id)
        .bind(&event.event_type)
        .bind(&event.checkpoint_id)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_instances(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InstanceRecord>, EngineError> {
        let records = sqlx::query_as::<_, InstanceRecord>(
            r#"
            SELECT instance_id, kind, status, created_at, started_at, finished_at, output, error
            FROM wf_instances
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
