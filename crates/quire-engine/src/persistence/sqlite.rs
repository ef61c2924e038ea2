//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::EngineError;

use super::{CheckpointRecord, EventRecord, InstanceRecord, Persistence};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file if missing, connects
    /// with sensible defaults, and runs all engine migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| EngineError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        crate::migrations::run_sqlite(&pool)
            .await
            .map_err(|e| EngineError::Database {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn register_instance(&self, instance_id: &str, kind: &str) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO wf_instances (instance_id, kind, status, created_at)
            VALUES (?, ?, 'pending', CURRENT_TIMESTAMP)
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
            WHERE instance_id = ?
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
            SET status = ?, started_at = COALESCE(?, started_at)
            WHERE instance_id = ?
            "#,
        )
        .bind(status)
        .bind(started_at)
        .bind(instance_id)
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
            SET status = ?, output = ?, error = ?, finished_at = ?
            WHERE instance_id = ?
            "#,
        )
        .bind(status)
        .bind(output)
        .bind(error)
        .bind(finished_at)
        .bind(instance_id)
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
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
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
            WHERE instance_id = ? AND checkpoint_id = ?
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
            VALUES (?, ?, ?, ?, ?)
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
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(status)
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
