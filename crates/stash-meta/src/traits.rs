use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stash_types::{BlobInfoId, BlobLocator, NamespaceId, NodeHandle, RefName};

use crate::error::MetaResult;
use crate::records::{BlobExport, BlobInfo, GcState, RefInfo};

/// Storage for blob rows, refs and GC progress.
///
/// Implementations must be safe to share between the request path and the
/// background tasks. Each method is atomic on its own; callers never rely
/// on multi-call transactions.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // -- Blobs --------------------------------------------------------------

    /// Insert a new row. Fails if the id or `(namespace, locator)` exists.
    async fn insert_blob(&self, info: BlobInfo) -> MetaResult<()>;

    async fn get_blob(&self, id: BlobInfoId) -> MetaResult<Option<BlobInfo>>;

    async fn find_blob_by_locator(
        &self,
        namespace: &NamespaceId,
        locator: &BlobLocator,
    ) -> MetaResult<Option<BlobInfo>>;

    /// Return the row for `(candidate.namespace, candidate.locator)`,
    /// inserting `candidate` if none exists.
    async fn get_or_insert_blob(&self, candidate: BlobInfo) -> MetaResult<BlobInfo>;

    /// Record the computed import graph of a row.
    ///
    /// Returns `false` if the row no longer exists.
    async fn set_blob_graph(
        &self,
        id: BlobInfoId,
        imports: Vec<BlobInfoId>,
        exports: Option<Vec<BlobExport>>,
    ) -> MetaResult<bool>;

    /// Rows whose imports are not computed yet, with `after < id < before`,
    /// in id order.
    async fn find_blobs_pending_imports(
        &self,
        after: Option<BlobInfoId>,
        before: BlobInfoId,
        limit: usize,
    ) -> MetaResult<Vec<BlobInfo>>;

    /// Remove a row. Returns `true` if it existed.
    async fn delete_blob(&self, id: BlobInfoId) -> MetaResult<bool>;

    /// Whether another blob imports `id` or a ref targets it.
    async fn is_referenced(&self, id: BlobInfoId) -> MetaResult<bool>;

    async fn find_nodes_by_alias(
        &self,
        namespace: &NamespaceId,
        alias: &str,
    ) -> MetaResult<Vec<NodeHandle>>;

    // -- Refs ---------------------------------------------------------------

    async fn get_ref(&self, namespace: &NamespaceId, name: &RefName) -> MetaResult<Option<RefInfo>>;

    /// Create or replace a ref. Returns the previous value.
    async fn upsert_ref(&self, info: RefInfo) -> MetaResult<Option<RefInfo>>;

    /// Remove a ref unconditionally. Returns the removed value.
    async fn delete_ref(&self, namespace: &NamespaceId, name: &RefName) -> MetaResult<Option<RefInfo>>;

    /// Remove a ref only if it is expired at `now`. Returns the removed value.
    async fn delete_ref_if_expired(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        now: DateTime<Utc>,
    ) -> MetaResult<Option<RefInfo>>;

    /// Move a ref's expiry to `expires_at` if that is later than the
    /// current one. Returns `false` if the ref is gone or never expires.
    async fn extend_ref_expiry(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        expires_at: DateTime<Utc>,
    ) -> MetaResult<bool>;

    /// Refs with `expires_at <= now`, oldest expiry first.
    async fn find_expired_refs(&self, now: DateTime<Utc>, limit: usize) -> MetaResult<Vec<RefInfo>>;

    // -- GC state -----------------------------------------------------------

    async fn gc_state(&self) -> MetaResult<GcState>;

    async fn set_import_cursor(&self, cursor: BlobInfoId) -> MetaResult<()>;

    async fn set_namespace_last_gc(&self, namespace: &NamespaceId, at: DateTime<Utc>) -> MetaResult<()>;

    /// Make the per-namespace list match `active`: add missing namespaces
    /// with no `last_run`, drop namespaces no longer configured.
    async fn reconcile_gc_namespaces(&self, active: &[NamespaceId]) -> MetaResult<GcState>;
}
