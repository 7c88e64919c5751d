use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use stash_types::{BlobInfoId, NamespaceId};
use tracing::warn;

use crate::error::CoordResult;
use crate::traits::{CoordinationService, Lease};

/// Queue score for an event at `time`: whole seconds since the epoch.
pub fn score_at(time: DateTime<Utc>) -> i64 {
    time.timestamp()
}

/// Per-namespace queues of blob rows awaiting a reachability check, plus
/// the per-namespace collector lease.
#[derive(Clone)]
pub struct GcQueue {
    coord: Arc<dyn CoordinationService>,
}

impl GcQueue {
    pub fn new(coord: Arc<dyn CoordinationService>) -> Self {
        Self { coord }
    }

    pub fn queue_key(namespace: &NamespaceId) -> String {
        format!("gc-check:{namespace}")
    }

    pub fn lease_key(namespace: &NamespaceId) -> String {
        format!("gc-lease:{namespace}")
    }

    pub async fn enqueue(&self, namespace: &NamespaceId, id: BlobInfoId, score: i64) -> CoordResult<()> {
        self.coord
            .enqueue(&Self::queue_key(namespace), &id.to_simple(), score)
            .await
    }

    /// Pop the lowest-scored row with `score <= max_score`.
    ///
    /// Members that do not parse as row ids are dropped with a warning.
    pub async fn pop_due(
        &self,
        namespace: &NamespaceId,
        max_score: i64,
    ) -> CoordResult<Option<(BlobInfoId, i64)>> {
        let key = Self::queue_key(namespace);
        while let Some(entry) = self.coord.pop_min(&key, max_score).await? {
            match entry.member.parse::<BlobInfoId>() {
                Ok(id) => return Ok(Some((id, entry.score))),
                Err(e) => warn!(queue = %key, member = %entry.member, error = %e, "dropping malformed queue entry"),
            }
        }
        Ok(None)
    }

    pub async fn len(&self, namespace: &NamespaceId) -> CoordResult<usize> {
        self.coord.queue_len(&Self::queue_key(namespace)).await
    }

    pub async fn try_lease(
        &self,
        namespace: &NamespaceId,
        holder: &str,
        ttl: Duration,
    ) -> CoordResult<Option<Lease>> {
        self.coord
            .try_acquire_lease(&Self::lease_key(namespace), holder, ttl)
            .await
    }

    pub async fn release(&self, namespace: &NamespaceId, holder: &str) -> CoordResult<bool> {
        self.coord
            .release_lease(&Self::lease_key(namespace), holder)
            .await
    }
}

impl std::fmt::Debug for GcQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcQueue").finish_non_exhaustive()
    }
}
