//! Time-windowed "used" marks for `(token, live)` pairs.
//!
//! [`MemoryReplayGuard`] is process-local. [`DbReplayGuard`] keeps marks in
//! the `qr_replay_marks` table so every instance sharing the database sees
//! them.

use crate::db::{Store, is_lock_contention, is_unique_violation};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Replay store error: {0}")]
    Backend(String),
}

impl From<sea_orm::DbErr> for ReplayError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Cache key for a token/live pair.
#[must_use]
pub fn mark_key(token: &str, live: &str) -> String {
    format!("used:{token}:{live}")
}

#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Whether an unexpired mark exists for the pair.
    async fn is_used(&self, token: &str, live: &str, now: DateTime<Utc>)
    -> Result<bool, ReplayError>;

    /// Atomically checks and marks the pair. Returns `true` when this call
    /// placed the mark and `false` when an unexpired mark already existed.
    async fn try_mark(
        &self,
        token: &str,
        live: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, ReplayError>;
}

/// Single-instance backend. The mutex is held across check and insert.
#[derive(Default)]
pub struct MemoryReplayGuard {
    marks: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryReplayGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.marks.lock().await.len()
    }
}

#[async_trait]
impl ReplayGuard for MemoryReplayGuard {
    async fn is_used(
        &self,
        token: &str,
        live: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ReplayError> {
        let marks = self.marks.lock().await;
        Ok(marks
            .get(&mark_key(token, live))
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn try_mark(
        &self,
        token: &str,
        live: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, ReplayError> {
        let mut marks = self.marks.lock().await;
        marks.retain(|_, expires_at| *expires_at > now);

        let key = mark_key(token, live);
        if marks.contains_key(&key) {
            return Ok(false);
        }

        marks.insert(key, now + ttl);
        Ok(true)
    }
}

/// Shared backend on the `qr_replay_marks` table. The unique key on
/// `mark_key` makes the insert the atomic check.
pub struct DbReplayGuard {
    store: Store,
    retry_attempts: u32,
    retry_backoff: std::time::Duration,
}

impl DbReplayGuard {
    #[must_use]
    pub const fn new(store: Store, retry_attempts: u32, retry_backoff: std::time::Duration) -> Self {
        Self {
            store,
            retry_attempts,
            retry_backoff,
        }
    }
}

#[async_trait]
impl ReplayGuard for DbReplayGuard {
    async fn is_used(
        &self,
        token: &str,
        live: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ReplayError> {
        Ok(self
            .store
            .replay_repo()
            .exists(&mark_key(token, live), now)
            .await?)
    }

    async fn try_mark(
        &self,
        token: &str,
        live: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, ReplayError> {
        let repo = self.store.replay_repo();
        let key = mark_key(token, live);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match repo.purge_expired(now).await {
                Ok(purged) => {
                    if purged > 0 {
                        debug!(purged, "Purged expired replay marks");
                    }
                    repo.insert(&key, now + ttl).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => return Ok(true),
                Err(e) if is_unique_violation(&e) => return Ok(false),
                Err(e) if is_lock_contention(&e) && attempt < self.retry_attempts => {
                    debug!(attempt, "Replay mark write contended, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
