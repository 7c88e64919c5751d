//! Revision-tracked namespace → backend wiring.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use stash_config::{resolve, BackendConfig, ConfigRevision, NamespaceConfig, ResolvedConfig, StorageConfig};
use stash_types::{BlobId, NamespaceId};
use tracing::info;

use crate::error::BackendResult;
use crate::factory::BackendFactory;
use crate::traits::Backend;

/// A namespace bound to its live backend.
pub struct NamespaceClient {
    pub config: NamespaceConfig,
    pub backend_config: BackendConfig,
    pub backend: Arc<dyn Backend>,
}

impl NamespaceClient {
    pub fn id(&self) -> &NamespaceId {
        &self.config.id
    }

    /// Path of a blob inside this namespace's backend.
    pub fn blob_path(&self, blob_id: &BlobId) -> String {
        self.config.blob_path(blob_id)
    }
}

impl std::fmt::Debug for NamespaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceClient")
            .field("namespace", &self.config.id)
            .field("backend", &self.backend_config.id)
            .finish()
    }
}

/// One immutable generation of the resolved configuration.
#[derive(Debug)]
pub struct RegistrySnapshot {
    pub revision: ConfigRevision,
    pub config: ResolvedConfig,
    pub namespaces: BTreeMap<NamespaceId, Arc<NamespaceClient>>,
}

impl RegistrySnapshot {
    fn build(
        factory: &dyn BackendFactory,
        doc: &StorageConfig,
        revision: ConfigRevision,
    ) -> BackendResult<Self> {
        let config = resolve(doc)?;
        let mut live: HashMap<&str, Arc<dyn Backend>> = HashMap::new();
        let mut namespaces = BTreeMap::new();
        for (id, resolved) in &config.namespaces {
            let backend_id = resolved.backend.id.as_str();
            let backend = match live.get(backend_id) {
                Some(backend) => backend.clone(),
                None => {
                    let backend = factory.create(&resolved.backend)?;
                    live.insert(backend_id, backend.clone());
                    backend
                }
            };
            namespaces.insert(
                id.clone(),
                Arc::new(NamespaceClient {
                    config: resolved.config.clone(),
                    backend_config: resolved.backend.clone(),
                    backend,
                }),
            );
        }
        Ok(Self {
            revision,
            config,
            namespaces,
        })
    }
}

/// Holds the current [`RegistrySnapshot`] and swaps it on reload.
///
/// Readers take an `Arc` to the snapshot and keep using it for the whole
/// operation; an update never mutates a snapshot in place.
pub struct ClientRegistry {
    factory: Arc<dyn BackendFactory>,
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl ClientRegistry {
    /// Resolve `doc` and build the initial snapshot.
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        doc: &StorageConfig,
        revision: ConfigRevision,
    ) -> BackendResult<Self> {
        let snapshot = RegistrySnapshot::build(factory.as_ref(), doc, revision)?;
        info!(
            revision = %snapshot.revision,
            namespaces = snapshot.namespaces.len(),
            "configuration loaded"
        );
        Ok(Self {
            factory,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().expect("lock poisoned").clone()
    }

    pub fn revision(&self) -> ConfigRevision {
        self.snapshot().revision.clone()
    }

    pub fn namespace(&self, id: &NamespaceId) -> Option<Arc<NamespaceClient>> {
        self.snapshot().namespaces.get(id).cloned()
    }

    /// Apply a configuration document.
    ///
    /// Returns `Ok(false)` without doing anything if `revision` matches the
    /// current one. Otherwise the new snapshot is fully built before it
    /// replaces the old one; on error the old snapshot keeps serving.
    pub fn update(&self, doc: &StorageConfig, revision: ConfigRevision) -> BackendResult<bool> {
        if self.snapshot().revision == revision {
            return Ok(false);
        }
        let snapshot = Arc::new(RegistrySnapshot::build(self.factory.as_ref(), doc, revision)?);
        let previous = {
            let mut current = self.current.write().expect("lock poisoned");
            if current.revision == snapshot.revision {
                return Ok(false);
            }
            std::mem::replace(&mut *current, snapshot.clone())
        };
        info!(
            from = %previous.revision,
            to = %snapshot.revision,
            namespaces = snapshot.namespaces.len(),
            "configuration revision applied"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use stash_config::{BackendKind, ConfigError};

    use super::*;
    use crate::error::BackendError;
    use crate::factory::DefaultBackendFactory;

    fn doc(namespaces: &[(&str, &str)]) -> StorageConfig {
        StorageConfig {
            backends: vec![
                BackendConfig {
                    kind: Some(BackendKind::Memory),
                    ..BackendConfig::new("mem")
                },
                BackendConfig {
                    base: Some("mem".into()),
                    ..BackendConfig::new("mem-child")
                },
            ],
            namespaces: namespaces
                .iter()
                .map(|(id, backend)| NamespaceConfig::new(NamespaceId::new(*id).unwrap(), *backend))
                .collect(),
            ..Default::default()
        }
    }

    fn ns(id: &str) -> NamespaceId {
        NamespaceId::new(id).unwrap()
    }

    fn registry(doc: &StorageConfig, rev: &str) -> ClientRegistry {
        ClientRegistry::new(Arc::new(DefaultBackendFactory::new()), doc, ConfigRevision::new(rev)).unwrap()
    }

    #[test]
    fn namespaces_resolve_through_inheritance() {
        let reg = registry(&doc(&[("a", "mem-child")]), "r1");
        let client = reg.namespace(&ns("a")).unwrap();
        assert_eq!(client.backend_config.kind, Some(BackendKind::Memory));
        assert!(reg.namespace(&ns("missing")).is_none());
    }

    #[test]
    fn namespaces_sharing_a_backend_share_the_client() {
        let reg = registry(&doc(&[("a", "mem"), ("b", "mem")]), "r1");
        let a = reg.namespace(&ns("a")).unwrap();
        let b = reg.namespace(&ns("b")).unwrap();
        assert!(Arc::ptr_eq(&a.backend, &b.backend));
    }

    #[test]
    fn same_revision_is_a_no_op() {
        let reg = registry(&doc(&[("a", "mem")]), "r1");
        let before = reg.snapshot();
        assert!(!reg.update(&doc(&[("a", "mem"), ("b", "mem")]), ConfigRevision::new("r1")).unwrap());
        assert!(Arc::ptr_eq(&before, &reg.snapshot()));
        assert!(reg.namespace(&ns("b")).is_none());
    }

    #[test]
    fn new_revision_swaps_snapshot() {
        let reg = registry(&doc(&[("a", "mem")]), "r1");
        let old = reg.snapshot();
        assert!(reg.update(&doc(&[("b", "mem")]), ConfigRevision::new("r2")).unwrap());
        assert_eq!(reg.revision().as_str(), "r2");
        assert!(reg.namespace(&ns("a")).is_none());
        assert!(reg.namespace(&ns("b")).is_some());
        // Holders of the old snapshot keep a consistent view.
        assert!(old.namespaces.contains_key(&ns("a")));
    }

    #[test]
    fn failed_update_keeps_old_state() {
        let reg = registry(&doc(&[("a", "mem")]), "r1");
        let err = reg
            .update(&doc(&[("a", "nope")]), ConfigRevision::new("r2"))
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Config(ConfigError::UnknownBackend { .. })
        ));
        assert_eq!(reg.revision().as_str(), "r1");
        assert!(reg.namespace(&ns("a")).is_some());
    }

    #[test]
    fn blob_path_applies_namespace_prefix() {
        let mut d = doc(&[]);
        let mut cfg = NamespaceConfig::new(ns("tools"), "mem");
        cfg.prefix = "tools/".into();
        d.namespaces.push(cfg);
        let reg = registry(&d, "r1");
        let client = reg.namespace(&ns("tools")).unwrap();
        assert_eq!(client.blob_path(&BlobId::new("x1").unwrap()), "tools/x1.blob");
    }
}
