// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the execution engine.

use thiserror::Error;

/// Infrastructure-level engine failures.
///
/// These are distinct from recorded step failures: an `EngineError` means the
/// engine itself could not persist or reload state, and it propagates out of
/// the workflow as a workflow-level error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A database operation against the persistence backend failed.
    #[error("database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A checkpoint payload could not be serialized or deserialized.
    #[error("serialization error for checkpoint '{checkpoint_id}': {details}")]
    Serialization {
        /// The checkpoint the payload belongs to.
        checkpoint_id: String,
        /// Error details.
        details: String,
    },

    /// An instance was not found where one was required.
    #[error("workflow instance '{instance_id}' not found")]
    InstanceNotFound {
        /// The missing instance id.
        instance_id: String,
    },

    /// An instance is in a state that does not permit the operation.
    #[error("workflow instance '{instance_id}' is in invalid state: expected '{expected}', got '{actual}'")]
    InvalidInstanceState {
        /// The instance id.
        instance_id: String,
        /// The expected status.
        expected: String,
        /// The actual status.
        actual: String,
    },
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}
