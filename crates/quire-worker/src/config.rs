// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.
//!
//! The worker is the only place the environment is read. Workflow code never
//! touches it; provider lists and versions travel through workflow inputs.

use std::path::PathBuf;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Pipe-separated LLM provider list.
    pub llm_providers: String,
    /// Pipe-separated embedding provider list.
    pub embed_providers: String,
    /// Quota cooldown window in seconds.
    pub provider_cooldown_seconds: u64,
    /// Declared embedding dimension.
    pub embed_dim: usize,
    /// Default embedding version (the retrieval contract).
    pub embed_version: String,
    /// Default chunk window size.
    pub chunk_size: usize,
    /// Default chunk overlap.
    pub chunk_overlap: usize,
    /// Default bound on concurrent ingest children.
    pub ingest_max_children: usize,
    /// Root of the input tree.
    pub data_in_root: PathBuf,
    /// Root of the artifact tree.
    pub data_out_root: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `QUIRE_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `QUIRE_LLM_PROVIDERS` (default: "mock")
    /// - `QUIRE_EMBED_PROVIDERS` (default: "mock")
    /// - `QUIRE_PROVIDER_COOLDOWN_SECONDS` (default: 900)
    /// - `QUIRE_EMBED_DIM` (default: 1536)
    /// - `QUIRE_EMBED_VERSION` (default: "v1")
    /// - `QUIRE_CHUNK_SIZE` (default: 1200)
    /// - `QUIRE_CHUNK_OVERLAP` (default: 200)
    /// - `QUIRE_INGEST_MAX_CHILDREN` (default: 3)
    /// - `QUIRE_DATA_IN` (default: "./data/in")
    /// - `QUIRE_DATA_OUT` (default: "./data/out")
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("QUIRE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("QUIRE_DATABASE_URL"))?;

        Ok(Self {
            database_url,
            llm_providers: getenv("QUIRE_LLM_PROVIDERS", "mock"),
            embed_providers: getenv("QUIRE_EMBED_PROVIDERS", "mock"),
            provider_cooldown_seconds: getenv_parsed("QUIRE_PROVIDER_COOLDOWN_SECONDS", 900)?,
            embed_dim: getenv_parsed("QUIRE_EMBED_DIM", 1536)?,
            embed_version: getenv("QUIRE_EMBED_VERSION", "v1"),
            chunk_size: getenv_parsed("QUIRE_CHUNK_SIZE", 1200)?,
            chunk_overlap: getenv_parsed("QUIRE_CHUNK_OVERLAP", 200)?,
            ingest_max_children: getenv_parsed("QUIRE_INGEST_MAX_CHILDREN", 3)?,
            data_in_root: PathBuf::from(getenv("QUIRE_DATA_IN", "./data/in")),
            data_out_root: PathBuf::from(getenv("QUIRE_DATA_OUT", "./data/out")),
        })
    }
}

fn getenv(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

fn getenv_parsed<T: std::str::FromStr>(key: &'static str, fallback: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| ConfigError::Invalid(key, "must be a valid number")),
        _ => Ok(fallback),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
