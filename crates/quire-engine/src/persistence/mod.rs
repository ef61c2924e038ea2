//! Persistence interfaces and backends for the execution engine.
//!
//! This module defines the persistence abstraction and backend
//! implementations. Postgres is the production backend; SQLite serves
//! single-node deployments and integration tests; [`MemoryPersistence`] backs
//! unit tests and embedded experimentation.

pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use self::memory::MemoryPersistence;
pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EngineError;

/// Workflow instance record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstanceRecord {
    /// Unique identifier for the instance (the workflow id).
    pub instance_id: String,
    /// Workflow kind (e.g. "corpus_ingest", "paper_process").
    pub kind: String,
    /// Current status (pending, running, completed, failed).
    pub status: String,
    /// When the instance was registered.
    pub created_at: DateTime<Utc>,
    /// When the instance started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the instance finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// JSON output from successful completion.
    pub output: Option<String>,
    /// Error message from failure.
    pub error: Option<String>,
}

/// Checkpoint record from the persistence layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CheckpointRecord {
    /// Instance this checkpoint belongs to.
    pub instance_id: String,
    /// Unique checkpoint identifier within the instance.
    pub checkpoint_id: String,
    /// Serialized outcome data.
    pub state: Vec<u8>,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

/// Event record from the persistence layer (instance lifecycle audit).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRecord {
    /// Instance this event belongs to.
    pub instance_id: String,
    /// Type of event (started, completed, failed).
    pub event_type: String,
    /// Associated checkpoint ID if applicable.
    pub checkpoint_id: Option<String>,
    /// Optional event payload data.
    pub payload: Option<Vec<u8>>,
    /// When the event occurred.
    pub created_at: DateTime<Utc>,
}

/// Persistence interface used by the workflow host and context.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Register an instance. Registering an existing id is a no-op, which is
    /// what makes workflow-id deduplication work.
    async fn register_instance(&self, instance_id: &str, kind: &str) -> Result<(), EngineError>;

    /// Fetch an instance by id.
    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, EngineError>;

    /// Update instance status, optionally stamping started_at.
    async fn update_instance_status(
        &self,
        instance_id: &str,
        status: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError>;

    /// Mark an instance terminal with output (completed) or error (failed).
    async fn complete_instance(
        &self,
        instance_id: &str,
        output: Option<&str>,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    /// Save a checkpoint. Saving an existing `(instance, checkpoint)` pair is
    /// a no-op; the first recorded outcome wins.
    async fn save_checkpoint(
        &self,
        instance_id: &str,
        checkpoint_id: &str,
        state: &[u8],
    ) -> Result<(), EngineError>;

    /// Load a checkpoint, if present.
    async fn load_checkpoint(
        &self,
        instance_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<CheckpointRecord>, EngineError>;

    /// Append a lifecycle event.
    async fn insert_event(&self, event: &EventRecord) -> Result<(), EngineError>;

    /// List instances, optionally filtered by status.
    async fn list_instances(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InstanceRecord>, EngineError>;

    /// Backend reachability check.
    async fn health_check(&self) -> Result<bool, EngineError>;
}
