// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow clock abstraction.
//!
//! Workflow code must never read wall-clock time directly; it goes through
//! the clock handed to the [`crate::WorkflowCtx`], and every read is
//! checkpointed. Production uses [`SystemClock`]; tests use [`ManualClock`],
//! which advances virtual time instantly on sleep so cooldown and backoff
//! schedules can be asserted without waiting.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source for workflow execution.
#[async_trait]
pub trait WorkflowClock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by tokio timers.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl WorkflowClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for tests.
///
/// `sleep` advances the virtual time by the requested duration and returns
/// immediately. `advance` moves time forward without a sleep call, which is
/// how tests step past provider cooldown windows.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock starting at the given instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the virtual time.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(DateTime::from_timestamp(1_700_000_000, 0).expect("valid epoch"))
    }
}

#[async_trait]
impl WorkflowClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::default();
        let before = clock.now();
        clock.sleep(Duration::from_secs(120)).await;
        assert_eq!(clock.now() - before, chrono::Duration::seconds(120));
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::default();
        let before = clock.now();
        clock.advance(Duration::from_secs(900));
        assert_eq!(clock.now() - before, chrono::Duration::seconds(900));
    }

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
