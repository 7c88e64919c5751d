use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use stash_backend::{BackendFactory, BlobReader, ClientRegistry, DefaultBackendFactory, NamespaceClient};
use stash_bundle::split_bundle;
use stash_config::{ConfigRevision, StorageConfig};
use stash_coord::{CoordinationService, GcQueue, InMemoryCoordination};
use stash_gc::{CollectSummary, GarbageCollector, ImportComputer, ImportSummary};
use stash_meta::{BlobExport, BlobInfo, InMemoryMetadataStore, MetadataStore, RefInfo};
use stash_refs::{ExpirySummary, RefCache, RefExpirer, RefOptions, RefStore};
use stash_types::{BlobId, BlobInfoIdGenerator, BlobLocator, Clock, NamespaceId, NodeHandle, RefName};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

/// A byte window of a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteBlobResponse {
    pub locator: BlobLocator,
    /// Set when the caller must upload the payload to this URL.
    pub upload_url: Option<String>,
}

pub enum ReadBlobResponse {
    Stream(BlobReader),
    Redirect(String),
}

impl std::fmt::Debug for ReadBlobResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
        }
    }
}

/// The storage façade: blob, alias and ref operations over every
/// configured namespace, plus the background passes that maintain them.
pub struct StorageService {
    registry: Arc<ClientRegistry>,
    meta: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<BlobInfoIdGenerator>,
    refs: RefStore,
    imports: Arc<ImportComputer>,
    collector: Arc<GarbageCollector>,
    expirer: Arc<RefExpirer>,
    instance_id: String,
}

impl StorageService {
    /// Wire a service over existing stores.
    pub fn new(
        registry: Arc<ClientRegistry>,
        meta: Arc<dyn MetadataStore>,
        coord: Arc<dyn CoordinationService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let snapshot = registry.snapshot();
        let instance_id = format!("{}-{}", snapshot.config.host, Uuid::now_v7().simple());
        let gc_queue = GcQueue::new(coord);
        let ids = Arc::new(BlobInfoIdGenerator::new());
        let cache = Arc::new(RefCache::new(&snapshot.config.ref_cache));

        let refs = RefStore::new(meta.clone(), gc_queue.clone(), clock.clone(), cache.clone());
        let imports = Arc::new(ImportComputer::new(
            meta.clone(),
            gc_queue.clone(),
            registry.clone(),
            clock.clone(),
            ids.clone(),
        ));
        let collector = Arc::new(GarbageCollector::new(
            meta.clone(),
            gc_queue.clone(),
            registry.clone(),
            clock.clone(),
            instance_id.clone(),
        ));
        let expirer = Arc::new(RefExpirer::new(
            meta.clone(),
            gc_queue,
            clock.clone(),
            cache,
            snapshot.config.gc.page_size,
        ));

        info!(instance = %instance_id, revision = %snapshot.revision, "storage service ready");
        Self {
            registry,
            meta,
            clock,
            ids,
            refs,
            imports,
            collector,
            expirer,
            instance_id,
        }
    }

    /// A single-process service with in-memory metadata and coordination.
    pub fn in_memory(
        doc: &StorageConfig,
        revision: ConfigRevision,
        factory: Arc<dyn BackendFactory>,
        clock: Arc<dyn Clock>,
    ) -> ServiceResult<Self> {
        let registry = Arc::new(ClientRegistry::new(factory, doc, revision)?);
        let meta = Arc::new(InMemoryMetadataStore::new());
        let coord = Arc::new(InMemoryCoordination::new(clock.clone()));
        Ok(Self::new(registry, meta, coord, clock))
    }

    /// [`Self::in_memory`] with the default backend factory.
    pub fn from_config(doc: &StorageConfig, revision: ConfigRevision, clock: Arc<dyn Clock>) -> ServiceResult<Self> {
        Self::in_memory(doc, revision, Arc::new(DefaultBackendFactory::new()), clock)
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.meta
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // ---- Blobs ----

    /// Register a new blob and store its payload.
    ///
    /// Without a payload the backend must be able to hand out an upload
    /// URL; the blob is registered immediately either way.
    pub async fn write_blob(&self, namespace: &NamespaceId, payload: Option<Bytes>) -> ServiceResult<WriteBlobResponse> {
        let snapshot = self.registry.snapshot();
        let client = snapshot
            .namespaces
            .get(namespace)
            .ok_or_else(|| ServiceError::NamespaceNotFound(namespace.clone()))?;

        let id = self.ids.next(self.clock.now());
        let blob_id = BlobId::with_prefix(&client.config.prefix, id)?;
        let locator = BlobLocator::new(snapshot.config.host.clone(), blob_id);
        let path = client.blob_path(&locator.blob_id);
        let mut info = BlobInfo::new(id, namespace.clone(), locator.clone());

        let upload_url = match payload {
            Some(data) => {
                let limit = snapshot.config.server.max_blob_size;
                if data.len() as u64 > limit {
                    return Err(ServiceError::PayloadTooLarge {
                        size: data.len() as u64,
                        limit,
                    });
                }
                let mut reader: &[u8] = &data;
                client.backend.write(&path, &mut reader).await?;
                if client.config.enable_aliases {
                    info.exports = eager_exports(&data);
                }
                None
            }
            None => Some(
                client
                    .backend
                    .redirect_for_write(&path)
                    .await?
                    .ok_or_else(|| ServiceError::PayloadRequired(namespace.clone()))?,
            ),
        };

        if let Err(e) = self.meta.insert_blob(info).await {
            // A stored object without a row is invisible to collection.
            if upload_url.is_none() {
                if let Err(cleanup) = client.backend.delete(&path).await {
                    warn!(namespace = %namespace, path, error = %cleanup, "failed to remove unregistered blob object");
                }
            }
            return Err(e.into());
        }
        debug!(namespace = %namespace, locator = %locator, blob = %id, redirect = upload_url.is_some(), "blob registered");
        Ok(WriteBlobResponse { locator, upload_url })
    }

    /// Open a blob, or return a URL to fetch it from directly.
    ///
    /// Ranged reads are always served as a stream.
    pub async fn read_blob(
        &self,
        namespace: &NamespaceId,
        locator: &BlobLocator,
        range: Option<ByteRange>,
    ) -> ServiceResult<ReadBlobResponse> {
        let client = self.namespace(namespace)?;
        let path = client.blob_path(&locator.blob_id);
        let reader = match range {
            Some(range) => client.backend.read_range(&path, range.offset, range.length).await?,
            None => {
                if let Some(url) = client.backend.redirect_for_read(&path).await? {
                    return Ok(ReadBlobResponse::Redirect(url));
                }
                client.backend.read(&path).await?
            }
        };
        reader
            .map(ReadBlobResponse::Stream)
            .ok_or_else(|| ServiceError::BlobNotFound {
                namespace: namespace.clone(),
                locator: locator.clone(),
            })
    }

    pub async fn find_nodes_by_alias(&self, namespace: &NamespaceId, alias: &str) -> ServiceResult<Vec<NodeHandle>> {
        let client = self.namespace(namespace)?;
        if !client.config.enable_aliases {
            return Err(ServiceError::AliasesDisabled(namespace.clone()));
        }
        Ok(self.meta.find_nodes_by_alias(namespace, alias).await?)
    }

    // ---- Refs ----

    pub async fn write_ref(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        target: NodeHandle,
        options: RefOptions,
    ) -> ServiceResult<RefInfo> {
        self.namespace(namespace)?;
        Ok(self.refs.write_ref_target(namespace, name, target, options).await?)
    }

    pub async fn read_ref(
        &self,
        namespace: &NamespaceId,
        name: &RefName,
        staleness: Option<Duration>,
    ) -> ServiceResult<Option<NodeHandle>> {
        self.namespace(namespace)?;
        Ok(self.refs.try_read_ref_target(namespace, name, staleness).await?)
    }

    pub async fn delete_ref(&self, namespace: &NamespaceId, name: &RefName) -> ServiceResult<bool> {
        self.namespace(namespace)?;
        Ok(self.refs.delete_ref(namespace, name).await?)
    }

    // ---- Configuration ----

    /// Apply a configuration document. Returns `false` if the revision is
    /// already current.
    pub fn update_config(&self, doc: &StorageConfig, revision: ConfigRevision) -> ServiceResult<bool> {
        Ok(self.registry.update(doc, revision)?)
    }

    // ---- Background passes ----

    pub fn import_computer(&self) -> &Arc<ImportComputer> {
        &self.imports
    }

    pub fn garbage_collector(&self) -> &Arc<GarbageCollector> {
        &self.collector
    }

    pub fn ref_expirer(&self) -> &Arc<RefExpirer> {
        &self.expirer
    }

    pub fn ref_cache(&self) -> &Arc<RefCache> {
        self.refs.cache()
    }

    /// Run one import pass to completion.
    pub async fn run_import_pass(&self) -> ServiceResult<ImportSummary> {
        Ok(self.imports.tick(&CancellationToken::new()).await?)
    }

    /// Run one collection pass to completion.
    pub async fn run_gc_pass(&self) -> ServiceResult<CollectSummary> {
        Ok(self.collector.tick(&CancellationToken::new()).await?)
    }

    /// Run one ref expiry sweep to completion.
    pub async fn run_ref_expiry(&self) -> ServiceResult<ExpirySummary> {
        Ok(self.expirer.tick(&CancellationToken::new()).await?)
    }

    fn namespace(&self, namespace: &NamespaceId) -> ServiceResult<Arc<NamespaceClient>> {
        self.registry
            .namespace(namespace)
            .ok_or_else(|| ServiceError::NamespaceNotFound(namespace.clone()))
    }
}

/// Exports of a buffered payload; empty for non-bundles.
fn eager_exports(data: &[u8]) -> Option<Vec<BlobExport>> {
    match split_bundle(data) {
        Ok((header, _)) => Some(
            header
                .exports
                .into_iter()
                .map(|e| BlobExport {
                    hash: e.hash,
                    alias: e.alias,
                    index: e.index,
                })
                .collect(),
        ),
        Err(stash_bundle::BundleError::NotABundle) => Some(Vec::new()),
        Err(_) => None,
    }
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService")
            .field("instance_id", &self.instance_id)
            .field("revision", &self.registry.revision())
            .finish_non_exhaustive()
    }
}
