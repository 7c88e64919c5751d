use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_types::clock::sub_duration;

use crate::error::CoordResult;

/// One member of a score-ordered queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub member: String,
    pub score: i64,
}

/// A granted lease.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub key: String,
    pub holder: String,
    /// Increases every time the lease changes hands.
    pub fencing_token: u64,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Lease {
    /// True once at least half of the lease duration is spent.
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        now >= sub_duration(self.expires_at, self.ttl / 2)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Queues and leases shared between service instances.
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Add `member` to `queue` with `score`.
    ///
    /// If the member is already queued, it keeps the larger of the two
    /// scores.
    async fn enqueue(&self, queue: &str, member: &str, score: i64) -> CoordResult<()>;

    /// Remove and return the lowest-scored entry whose score is at most
    /// `max_score`.
    async fn pop_min(&self, queue: &str, max_score: i64) -> CoordResult<Option<QueueEntry>>;

    async fn queue_len(&self, queue: &str) -> CoordResult<usize>;

    /// Acquire or extend the lease `key` for `holder`.
    ///
    /// Returns `None` if another holder owns an unexpired lease.
    async fn try_acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> CoordResult<Option<Lease>>;

    /// Release a lease held by `holder`. Returns `false` if it was not held.
    async fn release_lease(&self, key: &str, holder: &str) -> CoordResult<bool>;
}
