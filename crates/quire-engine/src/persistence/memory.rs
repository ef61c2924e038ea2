//! In-memory persistence implementation.
//!
//! Functional (not a stub): checkpoints, instances, and events behave exactly
//! as the database backends do, so workflow logic can be exercised in unit
//! tests without a database. Not crash-durable, by definition.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::EngineError;

use super::{CheckpointRecord, EventRecord, InstanceRecord, Persistence};

#[derive(Default)]
struct MemoryState {
    instances: HashMap<String, InstanceRecord>,
    checkpoints: HashMap<(String, String), CheckpointRecord>,
    events: Vec<EventRecord>,
}

/// In-memory persistence provider for tests and embedded use.
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<MemoryState>,
}

impl MemoryPersistence {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded checkpoints (test helper).
    pub fn checkpoint_count(&self) -> usize {
        self.state.lock().expect("memory state lock").checkpoints.len()
    }

    /// Recorded lifecycle events (test helper).
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.lock().expect("memory state lock").events.clone()
    }
}

#[async_trait::async_trait]
impl Persistence for MemoryPersistence {
    async fn register_instance(&self, instance_id: &str, kind: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("memory state lock");
        state
            .instances
            .entry(instance_id.to_string())
            .or_insert_with(|| InstanceRecord {
                instance_id: instance_id.to_string(),
                kind: kind.to_string(),
                status: "pending".to_string(),
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
                output: None,
                error: None,
            });
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>, EngineError> {
        let state = self.state.lock().expect("memory state lock");
        Ok(state.instances.get(instance_id).cloned())
    }

    async fn update_instance_status(
        &self,
        instance_id: &str,
        status: &str,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("memory state lock");
        let record = state.instances.get_mut(instance_id).ok_or_else(|| {
            EngineError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            }
        })?;
        record.status = status.to_string();
        if record.started_at.is_none() {
            record.started_at = started_at;
        }
        Ok(())
    }

    async fn complete_instance(
        &self,
        instance_id: &str,
        output: Option<&str>,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("memory state lock");
        let record = state.instances.get_mut(instance_id).ok_or_else(|| {
            EngineError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            }
        })?;
        record.status = if error.is_some() { "failed" } else { "completed" }.to_string();
        record.output = output.map(str::to_string);
        record.error = error.map(str::to_string);
        record.finished_at = Some(finished_at);
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        instance_id: &str,
        checkpoint_id: &str,
        state_bytes: &[u8],
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("memory state lock");
        let key = (instance_id.to_string(), checkpoint_id.to_string());
        state.checkpoints.entry(key).or_insert_with(|| CheckpointRecord {
            instance_id: instance_id.to_string(),
            checkpoint_id: checkpoint_id.to_string(),
            state: state_bytes.to_vec(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        instance_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<CheckpointRecord>, EngineError> {
        let state = self.state.lock().expect("memory state lock");
        Ok(state
            .checkpoints
            .get(&(instance_id.to_string(), checkpoint_id.to_string()))
            .cloned())
    }

    async fn insert_event(&self, event: &EventRecord) -> Result<(), EngineError> {
        let mut state = self.state.lock().expect("memory state lock");
        state.events.push(event.clone());
        Ok(())
    }

    async fn list_instances(
        &self,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InstanceRecord>, EngineError> {
        let state = self.state.lock().expect("memory state lock");
        let mut records: Vec<InstanceRecord> = state
            .instances
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        Ok(true)
    }
}
