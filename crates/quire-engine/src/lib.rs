// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Quire Engine - Durable Execution Substrate
//!
//! This crate provides the execution substrate for quire's ingestion and
//! survey workflows. A workflow is an ordinary async function that receives a
//! [`WorkflowCtx`]; every side-effecting primitive it touches (activity steps,
//! clock reads, sleeps, child workflows) is checkpointed into the persistence
//! layer before the workflow proceeds, so a crashed worker replays the same
//! function and skips everything already recorded.
//!
//! # Checkpoint Semantics
//!
//! The checkpoint is the durability mechanism:
//!
//! 1. **First execution of a step key**: the step closure runs, its outcome
//!    (success payload or failure message) is saved under the key.
//! 2. **Replay with the same key**: the recorded outcome is returned without
//!    re-invoking the closure.
//!
//! Failures are recorded exactly like successes, so a step that failed
//! deterministically (e.g. a PDF with no extractable text) fails identically
//! on replay instead of re-running.
//!
//! # Determinism Rules
//!
//! Workflow code must not read wall-clock time, the environment, or any other
//! ambient state. [`WorkflowCtx::now`] and [`WorkflowCtx::sleep`] are the only
//! time primitives; both are checkpointed. Everything a workflow needs from
//! the outside world arrives either in its input or in a recorded step
//! outcome.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use quire_engine::{WorkflowHost, MemoryPersistence, StepOptions};
//!
//! let host = WorkflowHost::builder()
//!     .persistence(Arc::new(MemoryPersistence::new()))
//!     .build()?;
//!
//! let handle = host
//!     .start("ingest-42", "corpus_ingest", |ctx| async move {
//!         let listed: Vec<String> = ctx
//!             .step("list-inputs", StepOptions::default(), || async {
//!                 Ok(vec!["a.pdf".to_string()])
//!             })
//!             .await?;
//!         Ok(listed.len())
//!     })
//!     .await?;
//!
//! let count = handle.result().await?;
//! ```

mod clock;
mod context;
mod error;
mod host;
pub mod migrations;
pub mod persistence;

pub use clock::{ManualClock, SystemClock, WorkflowClock};
pub use context::{ActivityError, RetryConfig, StepError, StepOptions, WorkflowCtx, WorkflowError};
pub use error::EngineError;
pub use host::{WorkflowHandle, WorkflowHost, WorkflowHostBuilder, WorkflowStatus};
pub use persistence::{
    CheckpointRecord, EventRecord, InstanceRecord, MemoryPersistence, Persistence,
    PostgresPersistence, SqlitePersistence,
};
