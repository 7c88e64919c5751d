use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use stash_config::RefCacheSettings;
use stash_meta::RefInfo;
use stash_types::clock::to_chrono;
use stash_types::{NamespaceId, RefName};

type Key = (NamespaceId, RefName);

#[derive(Clone, Debug)]
struct CacheEntry {
    /// `None` caches a confirmed miss.
    value: Option<RefInfo>,
    observed_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

/// A cache hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedRef {
    pub value: Option<RefInfo>,
    /// When the value was read from (or written to) the metadata store.
    pub observed_at: DateTime<Utc>,
}

/// Fixed-capacity ref cache keyed by `(namespace, name)`.
///
/// Entries not accessed within the sliding expiration are dropped. When
/// full, idle entries are purged first, then the least recently accessed.
#[derive(Debug)]
pub struct RefCache {
    entries: DashMap<Key, CacheEntry>,
    capacity: usize,
    sliding_expiration: chrono::Duration,
}

impl RefCache {
    pub fn new(settings: &RefCacheSettings) -> Self {
        Self::with_limits(settings.capacity, settings.sliding_expiration())
    }

    pub fn with_limits(capacity: usize, sliding_expiration: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            sliding_expiration: to_chrono(sliding_expiration),
        }
    }

    /// Look up an entry, refreshing its access time.
    pub fn get(&self, namespace: &NamespaceId, name: &RefName, now: DateTime<Utc>) -> Option<CachedRef> {
        let key = (namespace.clone(), name.clone());
        let mut entry = self.entries.get_mut(&key)?;
        if now - entry.last_access > self.sliding_expiration {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        entry.last_access = now;
        Some(CachedRef {
            value: entry.value.clone(),
            observed_at: entry.observed_at,
        })
    }

    /// Store what the metadata store holds for a ref as of `now`.
    pub fn insert(&self, namespace: &NamespaceId, name: &RefName, value: Option<RefInfo>, now: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }
        self.entries.insert(
            (namespace.clone(), name.clone()),
            CacheEntry {
                value,
                observed_at: now,
                last_access: now,
            },
        );
        self.evict_if_needed(now);
    }

    pub fn invalidate(&self, namespace: &NamespaceId, name: &RefName) {
        self.entries.remove(&(namespace.clone(), name.clone()));
    }

    /// Drop entries idle past the sliding expiration. Returns how many.
    pub fn purge_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.last_access <= self.sliding_expiration);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_needed(&self, now: DateTime<Utc>) {
        if self.entries.len() <= self.capacity {
            return;
        }
        self.purge_idle(now);
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_access)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn ns() -> NamespaceId {
        NamespaceId::new("ns").unwrap()
    }

    fn name(s: &str) -> RefName {
        RefName::new(s).unwrap()
    }

    #[test]
    fn caches_misses_and_tracks_observation_time() {
        let cache = RefCache::with_limits(10, Duration::from_secs(60));
        assert!(cache.get(&ns(), &name("a"), t(0)).is_none());
        cache.insert(&ns(), &name("a"), None, t(0));
        let hit = cache.get(&ns(), &name("a"), t(10)).unwrap();
        assert_eq!(hit.value, None);
        assert_eq!(hit.observed_at, t(0));
    }

    #[test]
    fn sliding_expiration_drops_idle_entries() {
        let cache = RefCache::with_limits(10, Duration::from_secs(60));
        cache.insert(&ns(), &name("a"), None, t(0));
        // Each access pushes expiry out.
        assert!(cache.get(&ns(), &name("a"), t(50)).is_some());
        assert!(cache.get(&ns(), &name("a"), t(100)).is_some());
        assert!(cache.get(&ns(), &name("a"), t(161)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_accessed() {
        let cache = RefCache::with_limits(2, Duration::from_secs(600));
        cache.insert(&ns(), &name("a"), None, t(0));
        cache.insert(&ns(), &name("b"), None, t(1));
        cache.get(&ns(), &name("a"), t(2));
        cache.insert(&ns(), &name("c"), None, t(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&ns(), &name("b"), t(4)).is_none());
        assert!(cache.get(&ns(), &name("a"), t(4)).is_some());
        assert!(cache.get(&ns(), &name("c"), t(4)).is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let cache = RefCache::with_limits(0, Duration::from_secs(60));
        cache.insert(&ns(), &name("a"), None, t(0));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_purge() {
        let cache = RefCache::with_limits(10, Duration::from_secs(60));
        cache.insert(&ns(), &name("a"), None, t(0));
        cache.insert(&ns(), &name("b"), None, t(100));
        cache.invalidate(&ns(), &name("b"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_idle(t(100)), 1);
        assert!(cache.is_empty());
    }
}
