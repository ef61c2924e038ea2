// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider error type and the five-kind classifier.

use thiserror::Error;

/// Errors surfaced by provider handles.
///
/// The `Display` text is the classification surface: the failover engine
/// never inspects variants, only the rendered message, so HTTP bodies pass
/// through verbatim (an upstream `insufficient_quota` or `429` lands in the
/// message and drives the classifier).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key resolved for the configured alias.
    #[error("{provider} key missing for alias {alias:?}")]
    MissingKey {
        /// Provider name.
        provider: &'static str,
        /// The key alias that failed to resolve.
        alias: String,
    },

    /// Transport-level request failure.
    #[error("{provider} {operation} request failed: {details}")]
    Request {
        /// Provider name.
        provider: &'static str,
        /// Operation ("embedding", "generate").
        operation: &'static str,
        /// Error details.
        details: String,
    },

    /// Non-2xx HTTP response; body carried through for classification.
    #[error("{provider} {operation} error {status}: {body}")]
    Api {
        /// Provider name.
        provider: &'static str,
        /// Operation ("embedding", "generate").
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("decode {provider} {operation} response: {details}")]
    Decode {
        /// Provider name.
        provider: &'static str,
        /// Operation ("embedding", "generate").
        operation: &'static str,
        /// Error details.
        details: String,
    },

    /// Anything else (empty choices, missing inputs, ...).
    #[error("{0}")]
    Other(String),
}

/// Classified provider failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Quota or credit exhaustion; disable the provider for the cooldown.
    Quota,
    /// Rate limiting; bounded in-place backoff.
    Rate,
    /// Context window exceeded; caller may reduce and retry once.
    Context,
    /// Transient fault; bounded in-place backoff, no disable.
    Transient,
    /// Everything else; brief disable and try the next provider.
    Permanent,
}

impl ErrorKind {
    /// Stable string form, used in audit rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quota => "quota",
            Self::Rate => "rate",
            Self::Context => "context",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a provider error message to its [`ErrorKind`].
///
/// Pure substring detection on the lowercased text. Order matters: quota
/// markers win over rate markers ("insufficient_quota" responses often come
/// with a 429 status).
pub fn classify(message: &str) -> ErrorKind {
    let text = message.to_lowercase();
    if text.contains("quota") || text.contains("credit") || text.contains("insufficient_quota") {
        ErrorKind::Quota
    } else if text.contains("rate") || text.contains("429") {
        ErrorKind::Rate
    } else if text.contains("context") || text.contains("too long") {
        ErrorKind::Context
    } else if text.contains("timeout") || text.contains("temporarily") || text.contains("unavailable")
    {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    }
}
