//! Import-graph computation ("blob ticker").
//!
//! Blobs are uploaded before anything is known about what they depend on.
//! Once a blob is older than the configured import delay, this task reads
//! its bundle header, registers every imported blob in the same namespace,
//! and records the import edges so the collector can reason about it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use stash_backend::{ClientRegistry, NamespaceClient};
use stash_bundle::read_header;
use stash_coord::{score_at, GcQueue};
use stash_meta::{BlobExport, BlobInfo, MetadataStore};
use stash_types::clock::sub_duration;
use stash_types::{BlobInfoId, BlobInfoIdGenerator, Clock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::GcResult;

/// Outcome of one import pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub scanned: usize,
    /// Rows recorded as bundles with their imports.
    pub bundles: usize,
    /// Rows recorded as leaves (no bundle header).
    pub leaves: usize,
    /// Rows left pending for a later pass.
    pub deferred: usize,
    /// Rows whose namespace is no longer configured.
    pub skipped: usize,
    /// Whether the whole range was walked and the cursor advanced.
    pub completed: bool,
}

enum RowOutcome {
    Bundle,
    Leaf,
    Deferred,
    Skipped,
}

/// Computes blob import graphs for rows older than the import delay.
pub struct ImportComputer {
    meta: Arc<dyn MetadataStore>,
    gc_queue: GcQueue,
    registry: Arc<ClientRegistry>,
    clock: Arc<dyn Clock>,
    ids: Arc<BlobInfoIdGenerator>,
    /// Rows whose header failure was already logged at full level.
    reported: DashSet<BlobInfoId>,
}

impl ImportComputer {
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        gc_queue: GcQueue,
        registry: Arc<ClientRegistry>,
        clock: Arc<dyn Clock>,
        ids: Arc<BlobInfoIdGenerator>,
    ) -> Self {
        Self {
            meta,
            gc_queue,
            registry,
            clock,
            ids,
            reported: DashSet::new(),
        }
    }

    /// Walk every pending row created before `now - import_delay`.
    ///
    /// The import cursor only advances when the walk completes, so a
    /// cancelled pass is simply repeated.
    pub async fn tick(&self, cancel: &CancellationToken) -> GcResult<ImportSummary> {
        let snapshot = self.registry.snapshot();
        let settings = &snapshot.config.gc;
        let page_size = settings.page_size.max(1);
        let now = self.clock.now();
        let cutoff = BlobInfoId::floor(sub_duration(now, settings.import_delay()));

        let mut summary = ImportSummary::default();
        let mut after = None;
        loop {
            let page = self
                .meta
                .find_blobs_pending_imports(after, cutoff, page_size)
                .await?;
            for blob in &page {
                if cancel.is_cancelled() {
                    debug!(scanned = summary.scanned, "import pass cancelled");
                    return Ok(summary);
                }
                after = Some(blob.id);
                summary.scanned += 1;
                let client = snapshot.namespaces.get(&blob.namespace);
                match self.compute(client.map(Arc::as_ref), blob, settings.header_fetch_size, now).await? {
                    RowOutcome::Bundle => summary.bundles += 1,
                    RowOutcome::Leaf => summary.leaves += 1,
                    RowOutcome::Deferred => summary.deferred += 1,
                    RowOutcome::Skipped => summary.skipped += 1,
                }
            }
            if page.len() < page_size {
                break;
            }
        }

        self.meta.set_import_cursor(cutoff).await?;
        summary.completed = true;
        if summary.scanned > 0 {
            info!(
                scanned = summary.scanned,
                bundles = summary.bundles,
                leaves = summary.leaves,
                deferred = summary.deferred,
                skipped = summary.skipped,
                "import pass complete"
            );
        }
        Ok(summary)
    }

    async fn compute(
        &self,
        client: Option<&NamespaceClient>,
        blob: &BlobInfo,
        header_fetch_size: u64,
        now: DateTime<Utc>,
    ) -> GcResult<RowOutcome> {
        let Some(client) = client else {
            debug!(namespace = %blob.namespace, blob = %blob.id, "namespace not configured, skipping");
            return Ok(RowOutcome::Skipped);
        };

        let path = client.blob_path(&blob.locator.blob_id);
        let header = match read_header(client.backend.as_ref(), &path, header_fetch_size).await {
            Ok(header) => header,
            Err(e) => {
                if !self.reported.insert(blob.id) {
                    debug!(namespace = %blob.namespace, blob = %blob.id, path, error = %e, "blob header still unreadable");
                } else if e.is_transient() {
                    warn!(namespace = %blob.namespace, blob = %blob.id, path, error = %e, "blob header not readable yet");
                } else {
                    error!(namespace = %blob.namespace, blob = %blob.id, path, error = %e, "corrupt blob header");
                }
                return Ok(RowOutcome::Deferred);
            }
        };
        self.reported.remove(&blob.id);

        let (imports, exports, outcome) = match header {
            None => (Vec::new(), client.config.enable_aliases.then(Vec::new), RowOutcome::Leaf),
            Some(header) => {
                let mut imports = Vec::with_capacity(header.imports.len());
                for locator in header.imports {
                    let candidate = BlobInfo::new(self.ids.next(now), blob.namespace.clone(), locator);
                    let row = self.meta.get_or_insert_blob(candidate).await?;
                    if row.id != blob.id && !imports.contains(&row.id) {
                        imports.push(row.id);
                    }
                }
                let exports = client.config.enable_aliases.then(|| {
                    header
                        .exports
                        .into_iter()
                        .map(|e| BlobExport {
                            hash: e.hash,
                            alias: e.alias,
                            index: e.index,
                        })
                        .collect()
                });
                (imports, exports, RowOutcome::Bundle)
            }
        };

        let import_count = imports.len();
        if !self.meta.set_blob_graph(blob.id, imports, exports).await? {
            debug!(blob = %blob.id, "row deleted during import pass");
            return Ok(RowOutcome::Skipped);
        }
        debug!(namespace = %blob.namespace, blob = %blob.id, imports = import_count, "imports computed");

        if let Err(e) = self
            .gc_queue
            .enqueue(&blob.namespace, blob.id, score_at(now))
            .await
        {
            warn!(namespace = %blob.namespace, blob = %blob.id, error = %e, "failed to queue gc check");
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for ImportComputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportComputer").finish_non_exhaustive()
    }
}
