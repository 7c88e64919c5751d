//! Lease-coordinated garbage collection ("GC ticker").

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stash_backend::{ClientRegistry, NamespaceClient};
use stash_coord::{score_at, GcQueue, Lease};
use stash_meta::{GcState, MetadataStore};
use stash_types::clock::{sub_duration, to_chrono};
use stash_types::{BlobInfoId, Clock, NamespaceId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::GcResult;

/// Outcome of one collector tick across all namespaces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectSummary {
    /// Namespaces whose queue was fully drained.
    pub namespaces: usize,
    pub checked: usize,
    pub deleted: usize,
    /// Rows still referenced when checked.
    pub retained: usize,
    /// Rows put back because the import cursor has not passed them.
    pub deferred: usize,
}

#[derive(Debug, Default)]
struct NamespacePass {
    drained: bool,
    checked: usize,
    deleted: usize,
    retained: usize,
    deferred: usize,
}

/// Deletes unreferenced blobs, one namespace at a time.
pub struct GarbageCollector {
    meta: Arc<dyn MetadataStore>,
    gc_queue: GcQueue,
    registry: Arc<ClientRegistry>,
    clock: Arc<dyn Clock>,
    holder: String,
}

impl GarbageCollector {
    /// `holder` identifies this instance in the per-namespace lease.
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        gc_queue: GcQueue,
        registry: Arc<ClientRegistry>,
        clock: Arc<dyn Clock>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            meta,
            gc_queue,
            registry,
            clock,
            holder: holder.into(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Run every namespace that is due, most overdue first.
    ///
    /// A failure in one namespace is logged and the next one still runs.
    pub async fn tick(&self, cancel: &CancellationToken) -> GcResult<CollectSummary> {
        let snapshot = self.registry.snapshot();
        let active: Vec<NamespaceId> = snapshot.namespaces.keys().cloned().collect();
        let state = self.meta.reconcile_gc_namespaces(&active).await?;
        let now = self.clock.now();

        let mut summary = CollectSummary::default();
        for namespace in due_namespaces(&state, &snapshot.namespaces, now) {
            if cancel.is_cancelled() {
                break;
            }
            let Some(client) = snapshot.namespaces.get(&namespace) else {
                continue;
            };
            let lease_ttl = snapshot.config.gc.lease_duration();
            match self
                .collect_namespace(client, state.last_import_cursor, lease_ttl, cancel)
                .await
            {
                Ok(Some(pass)) => {
                    summary.checked += pass.checked;
                    summary.deleted += pass.deleted;
                    summary.retained += pass.retained;
                    summary.deferred += pass.deferred;
                    if pass.drained {
                        summary.namespaces += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => error!(namespace = %namespace, error = %e, "gc pass failed"),
            }
        }

        if summary.checked > 0 {
            info!(
                namespaces = summary.namespaces,
                checked = summary.checked,
                deleted = summary.deleted,
                retained = summary.retained,
                deferred = summary.deferred,
                "gc pass complete"
            );
        }
        Ok(summary)
    }

    /// Returns `None` if another instance holds the namespace lease.
    async fn collect_namespace(
        &self,
        client: &NamespaceClient,
        import_cursor: BlobInfoId,
        lease_ttl: std::time::Duration,
        cancel: &CancellationToken,
    ) -> GcResult<Option<NamespacePass>> {
        let namespace = client.id();
        let Some(lease) = self.gc_queue.try_lease(namespace, &self.holder, lease_ttl).await? else {
            debug!(namespace = %namespace, "gc lease held by another instance");
            return Ok(None);
        };
        debug!(namespace = %namespace, token = lease.fencing_token, "gc lease acquired");

        let result = self.drain(client, import_cursor, lease, cancel).await;
        if let Err(e) = self.gc_queue.release(namespace, &self.holder).await {
            warn!(namespace = %namespace, error = %e, "failed to release gc lease");
        }
        result.map(Some)
    }

    async fn drain(
        &self,
        client: &NamespaceClient,
        import_cursor: BlobInfoId,
        lease: Lease,
        cancel: &CancellationToken,
    ) -> GcResult<NamespacePass> {
        let namespace = client.id();
        let mut pass = NamespacePass::default();
        let mut deferred = Vec::new();

        let result = self
            .drain_due(client, import_cursor, lease, cancel, &mut pass, &mut deferred)
            .await;

        // Rows the import pass has not covered yet go back on the queue
        // whether or not the pass finished.
        for (id, score) in deferred {
            self.gc_queue.enqueue(namespace, id, score).await?;
            debug!(namespace = %namespace, blob = %id, "gc check deferred until imports are scanned");
        }

        if result? {
            self.meta
                .set_namespace_last_gc(namespace, self.clock.now())
                .await?;
            pass.drained = true;
        }
        Ok(pass)
    }

    /// Pop and check due entries. Returns `true` once the due part of the
    /// queue is empty, `false` if the pass stopped early.
    async fn drain_due(
        &self,
        client: &NamespaceClient,
        import_cursor: BlobInfoId,
        mut lease: Lease,
        cancel: &CancellationToken,
        pass: &mut NamespacePass,
        deferred: &mut Vec<(BlobInfoId, i64)>,
    ) -> GcResult<bool> {
        let namespace = client.id();

        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let now = self.clock.now();
            if lease.needs_renewal(now) {
                match self.gc_queue.try_lease(namespace, &self.holder, lease.ttl).await? {
                    Some(renewed) => lease = renewed,
                    None => {
                        warn!(namespace = %namespace, "gc lease lost, stopping pass");
                        return Ok(false);
                    }
                }
            }

            let max_score = score_at(sub_duration(now, client.config.gc_delay()));
            let Some((id, score)) = self.gc_queue.pop_due(namespace, max_score).await? else {
                return Ok(true);
            };
            pass.checked += 1;

            let Some(blob) = self.meta.get_blob(id).await? else {
                continue;
            };
            if &blob.namespace != namespace {
                continue;
            }
            // Unscanned rows are queued again by the import pass.
            let Some(imports) = blob.imports else {
                continue;
            };
            if id >= import_cursor {
                pass.deferred += 1;
                deferred.push((id, score));
                continue;
            }
            if self.meta.is_referenced(id).await? {
                pass.retained += 1;
                continue;
            }
            if !self.meta.delete_blob(id).await? {
                continue;
            }

            let path = client.blob_path(&blob.locator.blob_id);
            if let Err(e) = client.backend.delete(&path).await {
                warn!(namespace = %namespace, blob = %id, path, error = %e, "failed to delete blob object");
            }
            for import in imports {
                self.gc_queue.enqueue(namespace, import, score + 1).await?;
            }
            pass.deleted += 1;
            debug!(namespace = %namespace, blob = %id, locator = %blob.locator, "blob collected");
        }
    }
}

/// Namespaces due for collection, never-run first, then most overdue.
fn due_namespaces(
    state: &GcState,
    clients: &std::collections::BTreeMap<NamespaceId, Arc<NamespaceClient>>,
    now: DateTime<Utc>,
) -> Vec<NamespaceId> {
    let mut due: Vec<(NamespaceId, Option<chrono::Duration>)> = state
        .namespaces
        .iter()
        .filter_map(|ns| {
            let client = clients.get(&ns.namespace)?;
            let frequency = to_chrono(client.config.gc_frequency());
            match ns.last_run {
                None => Some((ns.namespace.clone(), None)),
                Some(last) if now - last > frequency => {
                    Some((ns.namespace.clone(), Some(now - last - frequency)))
                }
                Some(_) => None,
            }
        })
        .collect();

    due.sort_by(|(_, a), (_, b)| match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.cmp(a),
    });
    due.into_iter().map(|(namespace, _)| namespace).collect()
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}
