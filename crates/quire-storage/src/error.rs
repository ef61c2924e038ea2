// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage error type.

use thiserror::Error;

/// Errors from the relational store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A database operation failed.
    #[error("database error during '{operation}': {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A row could not be encoded/decoded.
    #[error("serialization error during '{operation}': {details}")]
    Serialization {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A required row was not found.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind ("paper", "survey run").
        entity: &'static str,
        /// Lookup key.
        key: String,
    },
}

impl StorageError {
    pub(crate) fn db(operation: &str, err: sqlx::Error) -> Self {
        Self::Database {
            operation: operation.to_string(),
            details: err.to_string(),
        }
    }
}
