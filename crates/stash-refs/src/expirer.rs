use std::sync::Arc;

use stash_coord::GcQueue;
use stash_meta::MetadataStore;
use stash_types::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::RefCache;
use crate::error::RefResult;
use crate::store::enqueue_unpinned;

/// Outcome of one expiry sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpirySummary {
    pub scanned: usize,
    pub deleted: usize,
}

/// Removes refs whose expiry has passed and queues their blobs.
pub struct RefExpirer {
    meta: Arc<dyn MetadataStore>,
    gc_queue: GcQueue,
    clock: Arc<dyn Clock>,
    cache: Arc<RefCache>,
    page_size: usize,
}

impl RefExpirer {
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        gc_queue: GcQueue,
        clock: Arc<dyn Clock>,
        cache: Arc<RefCache>,
        page_size: usize,
    ) -> Self {
        Self {
            meta,
            gc_queue,
            clock,
            cache,
            page_size: page_size.max(1),
        }
    }

    /// Delete every ref expired as of now.
    ///
    /// Each delete is conditional, so a ref rewritten since the scan is
    /// left alone. Stops early when `cancel` fires.
    pub async fn tick(&self, cancel: &CancellationToken) -> RefResult<ExpirySummary> {
        let now = self.clock.now();
        let mut summary = ExpirySummary::default();

        loop {
            let page = self.meta.find_expired_refs(now, self.page_size).await?;
            let mut deleted_in_page = 0;
            for candidate in &page {
                if cancel.is_cancelled() {
                    return Ok(summary);
                }
                summary.scanned += 1;
                let removed = self
                    .meta
                    .delete_ref_if_expired(&candidate.namespace, &candidate.name, now)
                    .await?;
                self.cache.invalidate(&candidate.namespace, &candidate.name);
                if let Some(removed) = removed {
                    debug!(namespace = %removed.namespace, name = %removed.name, "expired ref deleted");
                    enqueue_unpinned(&self.gc_queue, &removed, now).await;
                    deleted_in_page += 1;
                }
            }
            summary.deleted += deleted_in_page;
            if page.len() < self.page_size || deleted_in_page == 0 {
                break;
            }
        }

        if summary.deleted > 0 {
            info!(deleted = summary.deleted, "ref expiry sweep complete");
        }
        Ok(summary)
    }
}

impl std::fmt::Debug for RefExpirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefExpirer")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use stash_coord::InMemoryCoordination;
    use stash_meta::{BlobInfo, InMemoryMetadataStore, RefInfo};
    use stash_types::{BlobInfoIdGenerator, ContentHash, ManualClock, NamespaceId, NodeHandle, RefName};

    use super::*;
    use crate::store::{RefOptions, RefStore};

    struct Fixture {
        clock: Arc<ManualClock>,
        meta: Arc<InMemoryMetadataStore>,
        coord: Arc<InMemoryCoordination>,
        refs: RefStore,
        expirer: RefExpirer,
        blob: BlobInfo,
    }

    async fn fixture(page_size: usize) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let meta = Arc::new(InMemoryMetadataStore::new());
        let coord = Arc::new(InMemoryCoordination::new(clock.clone()));
        let cache = Arc::new(RefCache::with_limits(100, Duration::from_secs(600)));
        let queue = GcQueue::new(coord.clone());
        let refs = RefStore::new(meta.clone(), queue.clone(), clock.clone(), cache.clone());
        let expirer = RefExpirer::new(meta.clone(), queue, clock.clone(), cache, page_size);

        let id = BlobInfoIdGenerator::with_node(1).next(clock.now());
        let blob = BlobInfo::new(id, ns(), "h/b1".parse().unwrap());
        meta.insert_blob(blob.clone()).await.unwrap();
        Fixture {
            clock,
            meta,
            coord,
            refs,
            expirer,
            blob,
        }
    }

    fn ns() -> NamespaceId {
        NamespaceId::new("ns").unwrap()
    }

    fn target(blob: &BlobInfo) -> NodeHandle {
        NodeHandle::new(ContentHash::of(b"n"), blob.locator.clone(), 0)
    }

    async fn write(fx: &Fixture, name: &str, lifetime: Option<u64>) {
        let options = RefOptions {
            lifetime: lifetime.map(Duration::from_secs),
            extend: true,
        };
        fx.refs
            .write_ref_target(&ns(), &RefName::new(name).unwrap(), target(&fx.blob), options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sweeps_only_expired_refs() {
        let fx = fixture(10).await;
        write(&fx, "short", Some(10)).await;
        write(&fx, "long", Some(1000)).await;
        write(&fx, "forever", None).await;

        fx.clock.advance(Duration::from_secs(11));
        let summary = fx.expirer.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary, ExpirySummary { scanned: 1, deleted: 1 });
        assert_eq!(fx.meta.ref_count(), 2);
        assert_eq!(fx.coord.entries(&GcQueue::queue_key(&ns())).len(), 1);

        // The cached value is gone too.
        let read = fx
            .refs
            .try_read_ref_target(&ns(), &RefName::new("short").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn pages_through_large_backlog() {
        let fx = fixture(3).await;
        for i in 0..8 {
            write(&fx, &format!("r{i}"), Some(5)).await;
        }
        fx.clock.advance(Duration::from_secs(6));
        let summary = fx.expirer.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.deleted, 8);
        assert_eq!(fx.meta.ref_count(), 0);
    }

    #[tokio::test]
    async fn rewritten_ref_survives_sweep() {
        let fx = fixture(10).await;
        write(&fx, "r", Some(5)).await;
        fx.clock.advance(Duration::from_secs(6));

        // Rewrite directly in the store after the ref expired.
        let name = RefName::new("r").unwrap();
        let mut info: RefInfo = fx.meta.get_ref(&ns(), &name).await.unwrap().unwrap();
        info.expires_at = Some(fx.clock.now() + chrono::Duration::seconds(100));
        fx.meta.upsert_ref(info).await.unwrap();

        let summary = fx.expirer.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.deleted, 0);
        assert_eq!(fx.meta.ref_count(), 1);
    }

    #[tokio::test]
    async fn cancelled_sweep_stops() {
        let fx = fixture(10).await;
        write(&fx, "r", Some(5)).await;
        fx.clock.advance(Duration::from_secs(6));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = fx.expirer.tick(&cancel).await.unwrap();
        assert_eq!(summary, ExpirySummary::default());
        assert_eq!(fx.meta.ref_count(), 1);
    }
}
