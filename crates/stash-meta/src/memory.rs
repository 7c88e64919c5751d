//! In-memory metadata store.
//!
//! [`InMemoryMetadataStore`] keeps every table in one struct behind a
//! single `RwLock`, so each trait method observes and mutates a consistent
//! view. Reverse reference counts are maintained alongside the rows to make
//! `is_referenced` a lookup instead of a scan.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stash_types::{BlobInfoId, BlobLocator, NamespaceId, NodeHandle, RefName};

use crate::error::{MetaError, MetaResult};
use crate::records::{BlobExport, BlobInfo, GcState, NamespaceGcState, RefInfo};
use crate::traits::MetadataStore;

#[derive(Debug, Default)]
struct Tables {
    blobs: BTreeMap<BlobInfoId, BlobInfo>,
    by_locator: HashMap<(NamespaceId, BlobLocator), BlobInfoId>,
    /// Number of rows whose imports contain the key.
    importers: HashMap<BlobInfoId, usize>,
    refs: BTreeMap<(NamespaceId, RefName), RefInfo>,
    /// Number of refs targeting the key.
    ref_targets: HashMap<BlobInfoId, usize>,
    gc: GcState,
}

fn increment(map: &mut HashMap<BlobInfoId, usize>, id: BlobInfoId) {
    *map.entry(id).or_insert(0) += 1;
}

fn decrement(map: &mut HashMap<BlobInfoId, usize>, id: BlobInfoId) {
    if let Some(count) = map.get_mut(&id) {
        *count -= 1;
        if *count == 0 {
            map.remove(&id);
        }
    }
}

impl Tables {
    fn insert_blob(&mut self, info: BlobInfo) -> MetaResult<()> {
        if self.blobs.contains_key(&info.id) {
            return Err(MetaError::DuplicateBlob(info.id));
        }
        let key = (info.namespace.clone(), info.locator.clone());
        if self.by_locator.contains_key(&key) {
            return Err(MetaError::DuplicateLocator {
                namespace: key.0,
                locator: key.1,
            });
        }
        for import in info.imports.iter().flatten() {
            increment(&mut self.importers, *import);
        }
        self.by_locator.insert(key, info.id);
        self.blobs.insert(info.id, info);
        Ok(())
    }

    fn put_ref(&mut self, info: RefInfo) -> Option<RefInfo> {
        increment(&mut self.ref_targets, info.blob_info_id);
        let previous = self
            .refs
            .insert((info.namespace.clone(), info.name.clone()), info);
        if let Some(prev) = &previous {
            decrement(&mut self.ref_targets, prev.blob_info_id);
        }
        previous
    }

    fn take_ref(&mut self, key: &(NamespaceId, RefName)) -> Option<RefInfo> {
        let removed = self.refs.remove(key)?;
        decrement(&mut self.ref_targets, removed.blob_info_id);
        Some(removed)
    }
}

/// An in-memory implementation of [`MetadataStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    tables: RwLock<Tables>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blob rows.
    pub fn blob_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").blobs.len()
    }

    /// Number of refs across all namespaces.
    pub fn ref_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").refs.len()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert_blob(&self, info: BlobInfo) -> MetaResult<()> {
        self.tables.write().expect("lock poisoned").insert_blob(info)
    }

    async fn get_blob(&self, id: BlobInfoId) -> MetaResult<Option<BlobInfo>> {
        Ok(self.tables.read().expect("lock poisoned").blobs.get(&id).cloned())
    }

    async fn find_blob_by_locator(
        &self,
        namespace: &NamespaceId,
        locator: &BlobLocator,
    ) -> MetaResult<Option<BlobInfo>> {
        let tables = self.tables.read().expect("lock poisoned");
        let key = (namespace.clone(), locator.clone());
        Ok(tables
            .by_locator
            .get(&key)
            .and_then(|id| tables.blobs.get(id))
            .cloned())
    }

    async fn get_or_insert_blob(&self, candidate: BlobInfo) -> MetaResult<BlobInfo> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let key = (candidate.namespace.clone(), candidate.locator.clone());
        if let Some(existing) = tables.by_locator.get(&key).and_then(|id| tables.blobs.get(id)) {
            return Ok(existing.clone());
        }
        tables.insert_blob(candidate.clone())?;
        Ok(candidate)
    }

    async fn set_blob_graph(
        &self,
        id: BlobInfoId,
        imports: Vec<BlobInfoId>,
        exports: Option<Vec<BlobExport>>,
    ) -> MetaResult<bool> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let Some(previous) = tables.blobs.get(&id).map(|row| row.imports.clone()) else {
            return Ok(false);
        };
        for import in previous.iter().flatten() {
            decrement(&mut tables.importers, *import);
        }
        for import in &imports {
            increment(&mut tables.importers, *import);
        }
        if let Some(row) = tables.blobs.get_mut(&id) {
            row.imports = Some(imports);
            row.exports = exports;
        }
        Ok(true)
    }

    async fn find_blobs_pending_imports(
        &self,
        after: Option<BlobInfoId>,
        before: BlobInfoId,
        limit: usize,
    ) -> MetaResult<Vec<BlobInfo>> {
        let tables = self.tables.read().expect("lock poisoned");
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        if after.is_some_and(|id| id >= before) {
            return Ok(Vec::new());
        }
        Ok(tables
            .blobs
            .range((lower, Bound::Excluded(before)))
            .map(|(_, info)| info)
            .filter(|info| !info.imports_computed())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_blob(&self, id: BlobInfoId) -> MetaResult<bool> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let Some(removed) = tables.blobs.remove(&id) else {
            return Ok(false);
        };
        tables
            .by_locator
            .remove(&(removed.namespace.clone(), removed.locator.clone()));
        for import in removed.imports.iter().flatten() {
            decrement(&mut tables.importers, *import);
        }
        Ok(true)
    }

    async fn is_referenced(&self, id: BlobInfoId) -> MetaResult<bool> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables.importers.contains_key(&id) || tables.ref_targets.contains_key(&id))
    }

    async fn find_nodes_by_alias(
        &self,
        namespace: &NamespaceId,
        alias: &str,
    ) -> MetaResult<Vec<NodeHandle>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables
            .blobs
            .values()
            .filter(|info| &info.namespace == namespace)
            .flat_map(|info| info.nodes_with_alias(alias))
            .collect())
    }

    async fn get_ref(&self, namespace: &NamespaceId, name: &RefName) -> MetaResult<Option<RefInfo>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables.refs.get(&(namespace.clone(), name.clone())).cloned())
    }

    async fn upsert_ref(&self, info: RefInfo) -> MetaResult<Option<RefInfo>> {
        Ok(self.tables.write().expect("lock poisoned").put_ref(info))
    }

    async fn delete_ref(&self, namespace: &NamespaceId, name: &RefName) -> MetaResult<Option<RefInfo>> {
        let mut tables = self.tables.write().expect("lock poisoned");
        Ok(tables.take_ref(&(namespace.clone(), name.clone())))
    }

    async fn delete_ref_if_expired(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        now: DateTime<Utc>,
    ) -> MetaResult<Option<RefInfo>> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let key = (namespace.clone(), name.clone());
        let expired = tables.refs.get(&key).is_some_and(|info| info.is_expired(now));
        if !expired {
            return Ok(None);
        }
        Ok(tables.take_ref(&key))
    }

    async fn extend_ref_expiry(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> MetaResult<bool> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let Some(info) = tables.refs.get_mut(&(namespace.clone(), name.clone())) else {
            return Ok(false);
        };
        match info.expires_at {
            Some(current) => {
                if expires_at > current {
                    info.expires_at = Some(expires_at);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_expired_refs(&self, now: DateTime<Utc>, limit: usize) -> MetaResult<Vec<RefInfo>> {
        let tables = self.tables.read().expect("lock poisoned");
        let mut expired: Vec<RefInfo> = tables
            .refs
            .values()
            .filter(|info| info.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|info| info.expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn gc_state(&self) -> MetaResult<GcState> {
        Ok(self.tables.read().expect("lock poisoned").gc.clone())
    }

    async fn set_import_cursor(&self, cursor: BlobInfoId) -> MetaResult<()> {
        self.tables.write().expect("lock poisoned").gc.last_import_cursor = cursor;
        Ok(())
    }

    async fn set_namespace_last_gc(&self, namespace: &NamespaceId, at: DateTime<Utc>) -> MetaResult<()> {
        let mut tables = self.tables.write().expect("lock poisoned");
        match tables.gc.namespaces.iter_mut().find(|n| &n.namespace == namespace) {
            Some(state) => state.last_run = Some(at),
            None => tables.gc.namespaces.push(NamespaceGcState {
                namespace: namespace.clone(),
                last_run: Some(at),
            }),
        }
        Ok(())
    }

    async fn reconcile_gc_namespaces(&self, active: &[NamespaceId]) -> MetaResult<GcState> {
        let mut tables = self.tables.write().expect("lock poisoned");
        tables.gc.namespaces.retain(|n| active.contains(&n.namespace));
        for id in active {
            if tables.gc.namespace(id).is_none() {
                tables.gc.namespaces.push(NamespaceGcState {
                    namespace: id.clone(),
                    last_run: None,
                });
            }
        }
        Ok(tables.gc.clone())
    }
}
