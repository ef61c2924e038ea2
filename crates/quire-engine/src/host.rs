// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable workflow host.
//!
//! [`WorkflowHost`] plays the role the original worker process plays: it
//! owns the persistence backend and the clock, starts workflow instances by
//! id, exposes their progress to query handlers, and records terminal state.
//! The HTTP façade embeds a host directly; tests embed one with
//! [`crate::MemoryPersistence`] and [`crate::ManualClock`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::clock::{SystemClock, WorkflowClock};
use crate::context::{ProgressBoard, WorkflowCtx, WorkflowError};
use crate::error::EngineError;
use crate::persistence::{EventRecord, InstanceRecord, Persistence};

/// Builder for creating a [`WorkflowHost`].
pub struct WorkflowHostBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    clock: Arc<dyn WorkflowClock>,
}

impl std::fmt::Debug for WorkflowHostBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHostBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for WorkflowHostBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl WorkflowHostBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Override the workflow clock (tests use [`crate::ManualClock`]).
    pub fn clock(mut self, clock: Arc<dyn WorkflowClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the host.
    pub fn build(self) -> Result<WorkflowHost, EngineError> {
        let persistence = self.persistence.ok_or_else(|| EngineError::Database {
            operation: "build".to_string(),
            details: "persistence is required".to_string(),
        })?;
        Ok(WorkflowHost {
            inner: Arc::new(HostInner {
                persistence,
                clock: self.clock,
                progress: Arc::new(RwLock::new(HashMap::new())),
            }),
        })
    }
}

struct HostInner {
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn WorkflowClock>,
    progress: ProgressBoard,
}

/// Coarse instance status as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    /// Registered but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Status string not recognized.
    Unknown,
}

impl WorkflowStatus {
    fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Handle to a started workflow instance.
pub struct WorkflowHandle<T> {
    workflow_id: String,
    join: JoinHandle<Result<T, WorkflowError>>,
}

impl<T> WorkflowHandle<T> {
    /// The workflow id this handle refers to.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Await the workflow's terminal result.
    pub async fn result(self) -> Result<T, WorkflowError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(WorkflowError::Engine(EngineError::Database {
                operation: "task_join".to_string(),
                details: e.to_string(),
            })),
        }
    }
}

/// Embeddable workflow runtime.
#[derive(Clone)]
pub struct WorkflowHost {
    inner: Arc<HostInner>,
}

impl WorkflowHost {
    /// Create a new builder for configuring the host.
    pub fn builder() -> WorkflowHostBuilder {
        WorkflowHostBuilder::new()
    }

    /// Get a reference to the persistence layer.
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.inner.persistence
    }

    /// Start a workflow instance.
    ///
    /// If an instance with this id already completed, the stored output is
    /// returned through the handle and the function does not run again. Any
    /// other state (re)runs the function under a fresh context; replay takes
    /// care of already-recorded steps.
    pub async fn start<T, F, Fut>(
        &self,
        workflow_id: &str,
        kind: &str,
        f: F,
    ) -> Result<WorkflowHandle<T>, EngineError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(WorkflowCtx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, WorkflowError>> + Send,
    {
        let persistence = &self.inner.persistence;

        if let Some(existing) = persistence.get_instance(workflow_id).await?
            && existing.status == "completed"
            && let Some(output) = existing.output.clone()
        {
            let workflow_id = workflow_id.to_string();
            let id_for_task = workflow_id.clone();
            let join = tokio::spawn(async move {
                serde_json::from_str::<T>(&output).map_err(|e| {
                    WorkflowError::Engine(EngineError::Serialization {
                        checkpoint_id: format!("output:{}", id_for_task),
                        details: e.to_string(),
                    })
                })
            });
            return Ok(WorkflowHandle { workflow_id, join });
        }

        persistence.register_instance(workflow_id, kind).await?;
        let started_at = self.inner.clock.now();
        persistence
            .update_instance_status(workflow_id, "running", Some(started_at))
            .await?;
        persistence
            .insert_event(&EventRecord {
                instance_id: workflow_id.to_string(),
                event_type: "started".to_string(),
                checkpoint_id: None,
                payload: None,
                created_at: started_at,
            })
            .await?;

        let ctx = WorkflowCtx::new(
            workflow_id.to_string(),
            self.inner.persistence.clone(),
            self.inner.clock.clone(),
            self.inner.progress.clone(),
        );

        let inner = self.inner.clone();
        let id = workflow_id.to_string();
        let kind_owned = kind.to_string();
        let join = tokio::spawn(async move {
            info!(workflow_id = %id, kind = %kind_owned, "workflow started");
            let result = f(ctx).await;
            let finished_at = inner.clock.now();
            match &result {
                Ok(value) => {
                    let output = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
                    if let Err(e) = inner
                        .persistence
                        .complete_instance(&id, Some(&output), None, finished_at)
                        .await
                    {
                        error!(workflow_id = %id, error = %e, "failed to record completion");
                    }
                    let _ = inner
                        .persistence
                        .insert_event(&EventRecord {
                            instance_id: id.clone(),
                            event_type: "completed".to_string(),
                            checkpoint_id: None,
                            payload: None,
                            created_at: finished_at,
                        })
                        .await;
                    info!(workflow_id = %id, "workflow completed");
                }
                Err(err) => {
                    let message = err.to_string();
                    if let Err(e) = inner
                        .persistence
                        .complete_instance(&id, None, Some(&message), finished_at)
                        .await
                    {
                        error!(workflow_id = %id, error = %e, "failed to record failure");
                    }
                    let _ = inner
                        .persistence
                        .insert_event(&EventRecord {
                            instance_id: id.clone(),
                            event_type: "failed".to_string(),
                            checkpoint_id: None,
                            payload: Some(message.clone().into_bytes()),
                            created_at: finished_at,
                        })
                        .await;
                    error!(workflow_id = %id, error = %message, "workflow failed");
                }
            }
            result
        });

        Ok(WorkflowHandle {
            workflow_id: workflow_id.to_string(),
            join,
        })
    }

    /// Read the current progress value published by an instance, if any.
    pub fn query(&self, workflow_id: &str) -> Option<Value> {
        self.inner
            .progress
            .read()
            .expect("progress board lock")
            .get(workflow_id)
            .cloned()
    }

    /// Fetch the coarse status of an instance.
    pub async fn status(&self, workflow_id: &str) -> Result<WorkflowStatus, EngineError> {
        let record = self.inner.persistence.get_instance(workflow_id).await?;
        Ok(record
            .map(|r| WorkflowStatus::from_str(&r.status))
            .unwrap_or(WorkflowStatus::Unknown))
    }

    /// Fetch the full instance record.
    pub async fn instance(&self, workflow_id: &str) -> Result<Option<InstanceRecord>, EngineError> {
        self.inner.persistence.get_instance(workflow_id).await
    }
}
