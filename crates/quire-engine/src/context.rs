// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow execution context.
//!
//! [`WorkflowCtx`] is the only handle workflow code gets to the outside
//! world. Every primitive on it is checkpointed: the first execution records
//! an outcome, a replay returns the recorded outcome without re-executing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::clock::WorkflowClock;
use crate::error::EngineError;
use crate::persistence::Persistence;

/// Shared progress board, keyed by instance id. Query handlers read it.
pub(crate) type ProgressBoard = Arc<RwLock<HashMap<String, Value>>>;

/// Failure returned by an activity closure.
///
/// The message is the activity's entire error surface: provider failover
/// classifies it by substring, and content-error branches match on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityError {
    /// Human-readable failure text.
    pub message: String,
}

impl ActivityError {
    /// Create a new activity error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

/// Error surfaced to workflow code from a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The engine could not persist or reload the step outcome.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The activity failed; the message is the recorded failure text.
    #[error("{0}")]
    Failed(String),
}

/// Error returned by a workflow function.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Infrastructure fault in the engine.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// An activity failure the workflow chose not to swallow.
    #[error("{0}")]
    Step(String),

    /// Invalid workflow input; rejected before side effects.
    #[error("invalid input: {0}")]
    Input(String),
}

impl From<StepError> for WorkflowError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Engine(e) => WorkflowError::Engine(e),
            StepError::Failed(message) => WorkflowError::Step(message),
        }
    }
}

/// Retry configuration for the activity layer beneath provider failover.
///
/// This handles infrastructure flakiness (store hiccups, transport resets);
/// provider-level errors are classified and routed by the failover engine
/// above it.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just one attempt).
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub delay_ms: u64,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Delay before the given retry attempt (1-indexed), exponential backoff.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.delay_ms.saturating_mul(multiplier))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_ms: 2000,
        }
    }
}

/// Options for a single step execution.
#[derive(Debug, Clone)]
pub struct StepOptions {
    /// Start-to-close timeout for one attempt.
    pub start_to_close: Duration,
    /// Bounded retry policy for infrastructure failures.
    pub retry: RetryConfig,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }
}

impl StepOptions {
    /// Options with a longer start-to-close window (heavy activities).
    pub fn long_running() -> Self {
        Self {
            start_to_close: Duration::from_secs(300),
            ..Self::default()
        }
    }

    /// Options with no retry at all.
    pub fn no_retry() -> Self {
        Self {
            retry: RetryConfig::none(),
            ..Self::default()
        }
    }
}

/// Recorded step outcome. Either `ok` or `err` is set, never both.
#[derive(Debug, Serialize, Deserialize)]
struct StepRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<String>,
}

struct CtxInner {
    instance_id: String,
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn WorkflowClock>,
    progress: ProgressBoard,
}

/// Per-instance workflow context.
///
/// Cheap to clone; clones share the same instance history.
#[derive(Clone)]
pub struct WorkflowCtx {
    inner: Arc<CtxInner>,
}

impl WorkflowCtx {
    pub(crate) fn new(
        instance_id: String,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn WorkflowClock>,
        progress: ProgressBoard,
    ) -> Self {
        Self {
            inner: Arc::new(CtxInner {
                instance_id,
                persistence,
                clock,
                progress,
            }),
        }
    }

    /// The workflow id of this instance.
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Execute a checkpointed step.
    ///
    /// If a checkpoint exists for `key`, the recorded outcome (success or
    /// failure) is returned and the closure never runs. Otherwise the closure
    /// runs under the step's timeout and retry policy, and the final outcome
    /// is persisted before this call returns.
    pub async fn step<T, F, Fut>(&self, key: &str, opts: StepOptions, f: F) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        if let Some(record) = self.load_record(key).await? {
            return Self::unpack(key, record);
        }

        let mut attempt: u32 = 0;
        let outcome: Result<T, ActivityError> = loop {
            let result = match tokio::time::timeout(opts.start_to_close, f()).await {
                Ok(result) => result,
                Err(_) => Err(ActivityError::new(format!(
                    "activity '{}' timed out after {:?}",
                    key, opts.start_to_close
                ))),
            };
            match result {
                Ok(value) => break Ok(value),
                Err(err) if attempt < opts.retry.max_retries => {
                    attempt += 1;
                    debug!(
                        instance_id = %self.inner.instance_id,
                        step = key,
                        attempt,
                        error = %err,
                        "retrying step"
                    );
                    self.inner
                        .clock
                        .sleep(opts.retry.delay_for_attempt(attempt))
                        .await;
                }
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(value) => {
                let payload =
                    serde_json::to_value(&value).map_err(|e| EngineError::Serialization {
                        checkpoint_id: key.to_string(),
                        details: e.to_string(),
                    })?;
                self.save_record(
                    key,
                    &StepRecord {
                        ok: Some(payload),
                        err: None,
                    },
                )
                .await?;
                Ok(value)
            }
            Err(err) => {
                self.save_record(
                    key,
                    &StepRecord {
                        ok: None,
                        err: Some(err.message.clone()),
                    },
                )
                .await?;
                Err(StepError::Failed(err.message))
            }
        }
    }

    /// Deterministic clock read, checkpointed under `key`.
    pub async fn now(&self, key: &str) -> Result<DateTime<Utc>, EngineError> {
        let cp_key = format!("now:{}", key);
        if let Some(record) = self
            .inner
            .persistence
            .load_checkpoint(&self.inner.instance_id, &cp_key)
            .await?
        {
            let ts: DateTime<Utc> =
                serde_json::from_slice(&record.state).map_err(|e| EngineError::Serialization {
                    checkpoint_id: cp_key.clone(),
                    details: e.to_string(),
                })?;
            return Ok(ts);
        }
        let ts = self.inner.clock.now();
        let bytes = serde_json::to_vec(&ts).map_err(|e| EngineError::Serialization {
            checkpoint_id: cp_key.clone(),
            details: e.to_string(),
        })?;
        self.inner
            .persistence
            .save_checkpoint(&self.inner.instance_id, &cp_key, &bytes)
            .await?;
        Ok(ts)
    }

    /// Durable sleep. A replay that finds the checkpoint skips the wait.
    pub async fn sleep(&self, key: &str, duration: Duration) -> Result<(), EngineError> {
        let cp_key = format!("sleep:{}", key);
        if self
            .inner
            .persistence
            .load_checkpoint(&self.inner.instance_id, &cp_key)
            .await?
            .is_some()
        {
            return Ok(());
        }
        self.inner.clock.sleep(duration).await;
        self.inner
            .persistence
            .save_checkpoint(&self.inner.instance_id, &cp_key, b"1")
            .await?;
        Ok(())
    }

    /// Execute a child workflow.
    ///
    /// The parent records the child's outcome under `child:{child_id}`. A
    /// child instance that already completed is not re-run: its stored output
    /// is reused, which deduplicates resubmission by workflow id. A child
    /// that previously failed is re-registered and re-run.
    pub async fn child<T, F, Fut>(&self, child_id: &str, kind: &str, f: F) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(WorkflowCtx) -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        let parent_key = format!("child:{}", child_id);
        if let Some(record) = self.load_record(&parent_key).await? {
            return Self::unpack(&parent_key, record);
        }

        let persistence = &self.inner.persistence;
        if let Some(existing) = persistence.get_instance(child_id).await?
            && existing.status == "completed"
            && let Some(output) = existing.output.as_deref()
        {
            let value: Value =
                serde_json::from_str(output).map_err(|e| EngineError::Serialization {
                    checkpoint_id: parent_key.clone(),
                    details: e.to_string(),
                })?;
            let record = StepRecord {
                ok: Some(value),
                err: None,
            };
            self.save_record(&parent_key, &record).await?;
            return Self::unpack(&parent_key, record);
        }

        persistence.register_instance(child_id, kind).await?;
        persistence
            .update_instance_status(child_id, "running", Some(self.inner.clock.now()))
            .await?;

        let child_ctx = WorkflowCtx::new(
            child_id.to_string(),
            self.inner.persistence.clone(),
            self.inner.clock.clone(),
            self.inner.progress.clone(),
        );

        match f(child_ctx).await {
            Ok(value) => {
                let payload =
                    serde_json::to_value(&value).map_err(|e| EngineError::Serialization {
                        checkpoint_id: parent_key.clone(),
                        details: e.to_string(),
                    })?;
                persistence
                    .complete_instance(
                        child_id,
                        Some(&payload.to_string()),
                        None,
                        self.inner.clock.now(),
                    )
                    .await?;
                self.save_record(
                    &parent_key,
                    &StepRecord {
                        ok: Some(payload),
                        err: None,
                    },
                )
                .await?;
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                persistence
                    .complete_instance(child_id, None, Some(&message), self.inner.clock.now())
                    .await?;
                self.save_record(
                    &parent_key,
                    &StepRecord {
                        ok: None,
                        err: Some(message.clone()),
                    },
                )
                .await?;
                Err(StepError::Failed(message))
            }
        }
    }

    /// Publish the progress struct for this instance's query handler.
    pub fn set_progress<P: Serialize>(&self, progress: &P) {
        if let Ok(value) = serde_json::to_value(progress) {
            self.inner
                .progress
                .write()
                .expect("progress board lock")
                .insert(self.inner.instance_id.clone(), value);
        }
    }

    async fn load_record(&self, key: &str) -> Result<Option<StepRecord>, EngineError> {
        let Some(checkpoint) = self
            .inner
            .persistence
            .load_checkpoint(&self.inner.instance_id, key)
            .await?
        else {
            return Ok(None);
        };
        let record: StepRecord =
            serde_json::from_slice(&checkpoint.state).map_err(|e| EngineError::Serialization {
                checkpoint_id: key.to_string(),
                details: e.to_string(),
            })?;
        Ok(Some(record))
    }

    async fn save_record(&self, key: &str, record: &StepRecord) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(record).map_err(|e| EngineError::Serialization {
            checkpoint_id: key.to_string(),
            details: e.to_string(),
        })?;
        self.inner
            .persistence
            .save_checkpoint(&self.inner.instance_id, key, &bytes)
            .await
    }

    fn unpack<T: DeserializeOwned>(key: &str, record: StepRecord) -> Result<T, StepError> {
        if let Some(message) = record.err {
            return Err(StepError::Failed(message));
        }
        let value = record.ok.unwrap_or(Value::Null);
        let decoded = serde_json::from_value(value).map_err(|e| EngineError::Serialization {
            checkpoint_id: key.to_string(),
            details: e.to_string(),
        })?;
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryPersistence;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_ctx(persistence: Arc<MemoryPersistence>, clock: Arc<ManualClock>) -> WorkflowCtx {
        WorkflowCtx::new(
            "wf-test".to_string(),
            persistence,
            clock,
            Arc::new(RwLock::new(HashMap::new())),
        )
    }

    #[tokio::test]
    async fn test_step_runs_once_and_replays_from_checkpoint() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let ctx = test_ctx(persistence, Arc::new(ManualClock::default()));

        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            let got: u32 = ctx
                .step("add", StepOptions::no_retry(), move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7u32)
                    }
                })
                .await
                .unwrap();
            assert_eq!(got, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_step_records_failure_deterministically() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let ctx = test_ctx(persistence, Arc::new(ManualClock::default()));

        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            let result: Result<u32, StepError> = ctx
                .step("boom", StepOptions::no_retry(), move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(ActivityError::new("no extractable text found in PDF"))
                    }
                })
                .await;
            match result {
                Err(StepError::Failed(message)) => {
                    assert_eq!(message, "no extractable text found in PDF")
                }
                other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
            }
        }
        // Second call replayed the recorded failure without re-invoking.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_step_retries_then_succeeds() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let ctx = test_ctx(persistence, clock.clone());

        let calls = Arc::new(AtomicU32::new(0));
        let opts = StepOptions {
            retry: RetryConfig::new(2, 1000),
            ..StepOptions::default()
        };
        let before = clock.now();
        let calls_in = calls.clone();
        let got: String = ctx
            .step("flaky", opts, move || {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ActivityError::new("connection reset"))
                    } else {
                        Ok("ok".to_string())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(got, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff slept 1s then 2s of virtual time.
        assert_eq!(clock.now() - before, chrono::Duration::seconds(3));
    }

    #[tokio::test]
    async fn test_now_is_replay_stable() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let ctx = test_ctx(persistence, clock.clone());

        let first = ctx.now("started").await.unwrap();
        clock.advance(Duration::from_secs(3600));
        let replayed = ctx.now("started").await.unwrap();
        assert_eq!(first, replayed);
    }

    #[tokio::test]
    async fn test_sleep_is_skipped_on_replay() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let ctx = test_ctx(persistence, clock.clone());

        ctx.sleep("backoff-1", Duration::from_secs(2)).await.unwrap();
        let after_first = clock.now();
        ctx.sleep("backoff-1", Duration::from_secs(2)).await.unwrap();
        assert_eq!(clock.now(), after_first);
    }

    #[tokio::test]
    async fn test_child_completed_output_is_reused() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let clock = Arc::new(ManualClock::default());

        // A prior run of the child already completed.
        persistence
            .register_instance("paper-c-old-pdf", "paper_process")
            .await
            .unwrap();
        persistence
            .complete_instance("paper-c-old-pdf", Some("\"processed\""), None, clock.now())
            .await
            .unwrap();

        let ctx = test_ctx(persistence, clock);
        let result: String = ctx
            .child("paper-c-old-pdf", "paper_process", |_child| async move {
                panic!("completed child must not re-run");
            })
            .await
            .unwrap();
        assert_eq!(result, "processed");
    }

    #[tokio::test]
    async fn test_child_failure_is_recorded_not_propagated_as_engine_error() {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.register_instance("wf-test", "t").await.unwrap();
        let ctx = test_ctx(persistence.clone(), Arc::new(ManualClock::default()));

        let result: Result<String, StepError> = ctx
            .child("child-x", "t", |_child| async move {
                Err(WorkflowError::Step("provider exploded".to_string()))
            })
            .await;
        assert!(matches!(result, Err(StepError::Failed(_))));

        let child = persistence.get_instance("child-x").await.unwrap().unwrap();
        assert_eq!(child.status, "failed");
        assert_eq!(child.error.as_deref(), Some("provider exploded"));
    }

    #[test]
    fn test_retry_delay_is_exponential() {
        let retry = RetryConfig::new(3, 100);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_step_options_presets() {
        assert_eq!(
            StepOptions::long_running().start_to_close,
            Duration::from_secs(300)
        );
        assert_eq!(StepOptions::no_retry().retry.max_retries, 0);
    }
}
