use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use stash_coord::{score_at, GcQueue};
use stash_meta::{MetadataStore, RefInfo};
use stash_types::clock::{add_duration, to_chrono};
use stash_types::{Clock, NamespaceId, NodeHandle, RefName};
use tracing::{debug, warn};

use crate::cache::RefCache;
use crate::error::{RefError, RefResult};

/// How a ref write treats expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefOptions {
    /// Time until the ref expires. `None` keeps it forever.
    pub lifetime: Option<Duration>,
    /// Whether reads late in the lifetime push the expiry out again.
    pub extend: bool,
}

impl Default for RefOptions {
    fn default() -> Self {
        Self {
            lifetime: None,
            extend: true,
        }
    }
}

impl RefOptions {
    pub fn expiring(lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            extend: true,
        }
    }

    /// Expire at a fixed time regardless of reads.
    pub fn without_extension(mut self) -> Self {
        self.extend = false;
        self
    }
}

/// Reads and writes refs through the metadata store and a shared cache.
pub struct RefStore {
    meta: Arc<dyn MetadataStore>,
    gc_queue: GcQueue,
    clock: Arc<dyn Clock>,
    cache: Arc<RefCache>,
}

impl RefStore {
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        gc_queue: GcQueue,
        clock: Arc<dyn Clock>,
        cache: Arc<RefCache>,
    ) -> Self {
        Self {
            meta,
            gc_queue,
            clock,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<RefCache> {
        &self.cache
    }

    /// Point `name` at `target`, replacing any previous value.
    ///
    /// The blob holding `target` must be registered in `namespace`. If the
    /// ref previously pinned a different blob, that blob is queued for a
    /// GC check.
    pub async fn write_ref_target(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        target: NodeHandle,
        options: RefOptions,
    ) -> RefResult<RefInfo> {
        let now = self.clock.now();
        let blob = self
            .meta
            .find_blob_by_locator(namespace, &target.locator)
            .await?
            .ok_or_else(|| RefError::BlobNotFound {
                namespace: namespace.clone(),
                locator: target.locator.clone(),
            })?;

        let info = RefInfo {
            namespace: namespace.clone(),
            name: name.clone(),
            target,
            blob_info_id: blob.id,
            expires_at: options.lifetime.map(|lifetime| add_duration(now, lifetime)),
            lifetime: options.lifetime.filter(|_| options.extend),
        };

        let previous = self.meta.upsert_ref(info.clone()).await?;
        if let Some(previous) = previous.filter(|p| p.blob_info_id != info.blob_info_id) {
            self.enqueue_check(&previous, now).await;
        }
        self.cache.insert(namespace, name, Some(info.clone()), now);
        debug!(namespace = %namespace, name = %name, blob = %info.blob_info_id, "ref written");
        Ok(info)
    }

    /// Resolve `name` to its target.
    ///
    /// A cached value is used when it was observed within `staleness` (any
    /// age if `None`) and is neither expired nor due for renewal. Expired
    /// refs are removed and reported as missing.
    pub async fn try_read_ref_target(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        staleness: Option<Duration>,
    ) -> RefResult<Option<NodeHandle>> {
        let now = self.clock.now();
        if let Some(hit) = self.cache.get(namespace, name, now) {
            let fresh = staleness.map_or(true, |bound| now - hit.observed_at <= to_chrono(bound));
            match hit.value {
                None if fresh => return Ok(None),
                Some(info) if fresh && !info.is_expired(now) && !info.needs_renewal(now) => {
                    return Ok(Some(info.target));
                }
                _ => {}
            }
        }

        let Some(mut info) = self.meta.get_ref(namespace, name).await? else {
            self.cache.insert(namespace, name, None, now);
            return Ok(None);
        };

        if info.is_expired(now) {
            match self.meta.delete_ref_if_expired(namespace, name, now).await? {
                Some(removed) => {
                    debug!(namespace = %namespace, name = %name, "expired ref removed on read");
                    self.enqueue_check(&removed, now).await;
                    self.cache.insert(namespace, name, None, now);
                }
                None => self.cache.invalidate(namespace, name),
            }
            return Ok(None);
        }

        if info.needs_renewal(now) {
            if let Some(expires_at) = info.renewed_expiry(now) {
                if self.meta.extend_ref_expiry(namespace, name, expires_at).await? {
                    debug!(namespace = %namespace, name = %name, expires_at = %expires_at, "ref renewed");
                    info.expires_at = Some(expires_at);
                }
            }
        }

        let target = info.target.clone();
        self.cache.insert(namespace, name, Some(info), now);
        Ok(Some(target))
    }

    /// Remove a ref. Returns whether it existed.
    pub async fn delete_ref(&self, namespace: &NamespaceId, name: &RefName) -> RefResult<bool> {
        let now = self.clock.now();
        let removed = self.meta.delete_ref(namespace, name).await?;
        self.cache.invalidate(namespace, name);
        match removed {
            Some(info) => {
                self.enqueue_check(&info, now).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn enqueue_check(&self, info: &RefInfo, now: DateTime<Utc>) {
        enqueue_unpinned(&self.gc_queue, info, now).await;
    }
}

/// Queue the blob a ref pinned for a GC check.
///
/// A failed enqueue only delays collection, so it is logged, not returned.
pub(crate) async fn enqueue_unpinned(gc_queue: &GcQueue, info: &RefInfo, now: DateTime<Utc>) {
    if let Err(e) = gc_queue
        .enqueue(&info.namespace, info.blob_info_id, score_at(now))
        .await
    {
        warn!(
            namespace = %info.namespace,
            blob = %info.blob_info_id,
            error = %e,
            "failed to queue unpinned blob for gc check"
        );
    }
}

impl std::fmt::Debug for RefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefStore")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
