// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for storage integration tests.
//!
//! Tests run only when TEST_DATABASE_URL points at a Postgres instance with
//! the pgvector extension available; otherwise they skip silently.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::PgPool;

static CORPUS_SEQ: AtomicU64 = AtomicU64::new(0);

/// A corpus id no other test run shares, so tests never see each other's
/// rows even against a long-lived database.
fn unique_corpus_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("corpus-{}-{}", nanos, CORPUS_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// Test context holding a migrated pool and a unique corpus id per test.
pub struct TestContext {
    pub pool: PgPool,
    pub corpus_id: String,
}

impl TestContext {
    /// Connect and migrate, or return None when no test database is
    /// configured.
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&database_url).await.ok()?;
        quire_storage::migrations::run(&pool).await.ok()?;
        Some(Self {
            pool,
            corpus_id: unique_corpus_id(),
        })
    }
}
