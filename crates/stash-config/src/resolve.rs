//! Backend inheritance and namespace wiring.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use stash_types::names::validate_identifier;
use stash_types::{HostId, NamespaceId};
use tracing::debug;

use crate::backend::BackendConfig;
use crate::document::{GcSettings, RefCacheSettings, ServerSettings, StorageConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::namespace::NamespaceConfig;

/// Opaque marker identifying one version of the configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConfigRevision(String);

impl ConfigRevision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Revision derived from the document text.
    pub fn of_document(text: &str) -> Self {
        Self(blake3::hash(text.as_bytes()).to_hex()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A namespace joined with its fully merged backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedNamespace {
    pub config: NamespaceConfig,
    pub backend: BackendConfig,
}

/// The configuration after inheritance merging and validation.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub host: HostId,
    pub server: ServerSettings,
    pub gc: GcSettings,
    pub ref_cache: RefCacheSettings,
    pub backends: BTreeMap<String, BackendConfig>,
    pub namespaces: BTreeMap<NamespaceId, Arc<ResolvedNamespace>>,
}

impl ResolvedConfig {
    pub fn namespace(&self, id: &NamespaceId) -> Option<&Arc<ResolvedNamespace>> {
        self.namespaces.get(id)
    }
}

/// Resolve a configuration document.
///
/// Each backend's base chain is resolved first, then every field the child
/// leaves unset is copied from its resolved base. Unknown bases, cycles,
/// duplicate ids, namespaces naming unknown backends and backends without a
/// `kind` after merging are all fatal.
pub fn resolve(config: &StorageConfig) -> ConfigResult<ResolvedConfig> {
    let host = HostId::new(config.host.clone())?;
    config.gc.validate()?;

    let mut declared: HashMap<&str, &BackendConfig> = HashMap::new();
    for backend in &config.backends {
        validate_identifier("backend id", &backend.id)?;
        if declared.insert(backend.id.as_str(), backend).is_some() {
            return Err(ConfigError::DuplicateBackend(backend.id.clone()));
        }
    }

    let mut resolver = BackendResolver {
        declared,
        resolved: HashMap::new(),
    };
    let mut backends = BTreeMap::new();
    for backend in &config.backends {
        let merged = resolver.resolve(&backend.id, &mut Vec::new())?;
        if merged.kind.is_none() {
            return Err(ConfigError::MissingField {
                backend: merged.id,
                field: "kind",
            });
        }
        backends.insert(backend.id.clone(), merged);
    }

    let mut namespaces = BTreeMap::new();
    for namespace in &config.namespaces {
        namespace.validate()?;
        let backend = backends
            .get(&namespace.backend)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBackend {
                id: namespace.backend.clone(),
                referenced_by: format!("namespace {:?}", namespace.id.as_str()),
            })?;
        let resolved = Arc::new(ResolvedNamespace {
            config: namespace.clone(),
            backend,
        });
        if namespaces.insert(namespace.id.clone(), resolved).is_some() {
            return Err(ConfigError::DuplicateNamespace(namespace.id.to_string()));
        }
    }

    debug!(
        backends = backends.len(),
        namespaces = namespaces.len(),
        "configuration resolved"
    );

    Ok(ResolvedConfig {
        host,
        server: config.server.clone(),
        gc: config.gc.clone(),
        ref_cache: config.ref_cache.clone(),
        backends,
        namespaces,
    })
}

struct BackendResolver<'a> {
    declared: HashMap<&'a str, &'a BackendConfig>,
    resolved: HashMap<String, BackendConfig>,
}

impl BackendResolver<'_> {
    /// Resolve `id`, memoizing results. `chain` holds the ids currently being
    /// resolved further up the stack.
    fn resolve(&mut self, id: &str, chain: &mut Vec<String>) -> ConfigResult<BackendConfig> {
        if let Some(done) = self.resolved.get(id) {
            return Ok(done.clone());
        }
        if chain.iter().any(|seen| seen == id) {
            chain.push(id.to_string());
            return Err(ConfigError::BaseCycle {
                chain: chain.join(" -> "),
            });
        }
        let declared = *self.declared.get(id).ok_or_else(|| ConfigError::UnknownBackend {
            id: id.to_string(),
            referenced_by: match chain.last() {
                Some(child) => format!("backend {child:?}"),
                None => "configuration".to_string(),
            },
        })?;

        let mut merged = declared.clone();
        if let Some(base) = &declared.base {
            chain.push(id.to_string());
            let base = self.resolve(base, chain)?;
            chain.pop();
            merged.apply_defaults_from(&base);
        }

        self.resolved.insert(id.to_string(), merged.clone());
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::backend::BackendKind;

    fn backend(id: &str, base: Option<&str>) -> BackendConfig {
        BackendConfig {
            base: base.map(str::to_string),
            ..BackendConfig::new(id)
        }
    }

    fn namespace(id: &str, backend: &str) -> NamespaceConfig {
        NamespaceConfig::new(NamespaceId::new(id).unwrap(), backend)
    }

    #[test]
    fn inheritance_merges_unset_fields() {
        let b1 = BackendConfig {
            kind: Some(BackendKind::FileSystem),
            root: Some("/x".into()),
            bucket_path: Some("p1".into()),
            ..backend("b1", None)
        };
        let b2 = BackendConfig {
            bucket_path: Some("p2".into()),
            ..backend("b2", Some("b1"))
        };
        let config = StorageConfig {
            backends: vec![b2, b1],
            namespaces: vec![namespace("ns", "b2")],
            ..Default::default()
        };

        let resolved = resolve(&config).unwrap();
        let b2 = &resolved.backends["b2"];
        assert_eq!(b2.root, Some(PathBuf::from("/x")));
        assert_eq!(b2.bucket_path.as_deref(), Some("p2"));
        assert_eq!(b2.kind, Some(BackendKind::FileSystem));

        let ns = resolved.namespace(&NamespaceId::new("ns").unwrap()).unwrap();
        assert_eq!(ns.backend, *b2);
    }

    #[test]
    fn inheritance_is_recursive() {
        let config = StorageConfig {
            backends: vec![
                BackendConfig {
                    kind: Some(BackendKind::Memory),
                    region: Some("r0".into()),
                    ..backend("a", None)
                },
                BackendConfig {
                    bucket: Some("bk".into()),
                    ..backend("b", Some("a"))
                },
                backend("c", Some("b")),
            ],
            ..Default::default()
        };
        let resolved = resolve(&config).unwrap();
        let c = &resolved.backends["c"];
        assert_eq!(c.kind, Some(BackendKind::Memory));
        assert_eq!(c.region.as_deref(), Some("r0"));
        assert_eq!(c.bucket.as_deref(), Some("bk"));
    }

    #[test]
    fn base_cycle_is_fatal() {
        let config = StorageConfig {
            backends: vec![
                backend("a", Some("b")),
                backend("b", Some("c")),
                backend("c", Some("a")),
            ],
            ..Default::default()
        };
        match resolve(&config).unwrap_err() {
            ConfigError::BaseCycle { chain } => assert_eq!(chain, "a -> b -> c -> a"),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn self_base_is_a_cycle() {
        let config = StorageConfig {
            backends: vec![backend("a", Some("a"))],
            ..Default::default()
        };
        assert!(matches!(resolve(&config), Err(ConfigError::BaseCycle { .. })));
    }

    #[test]
    fn unknown_base_is_fatal() {
        let config = StorageConfig {
            backends: vec![backend("a", Some("missing"))],
            ..Default::default()
        };
        match resolve(&config).unwrap_err() {
            ConfigError::UnknownBackend { id, referenced_by } => {
                assert_eq!(id, "missing");
                assert_eq!(referenced_by, "backend \"a\"");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn namespace_with_unknown_backend_is_fatal() {
        let config = StorageConfig {
            namespaces: vec![namespace("ns", "nope")],
            ..Default::default()
        };
        assert!(matches!(
            resolve(&config),
            Err(ConfigError::UnknownBackend { .. })
        ));
    }

    #[test]
    fn duplicates_are_fatal() {
        let mem = BackendConfig {
            kind: Some(BackendKind::Memory),
            ..backend("m", None)
        };
        let config = StorageConfig {
            backends: vec![mem.clone(), mem.clone()],
            ..Default::default()
        };
        assert!(matches!(resolve(&config), Err(ConfigError::DuplicateBackend(_))));

        let config = StorageConfig {
            backends: vec![mem],
            namespaces: vec![namespace("ns", "m"), namespace("ns", "m")],
            ..Default::default()
        };
        assert!(matches!(resolve(&config), Err(ConfigError::DuplicateNamespace(_))));
    }

    #[test]
    fn backend_without_kind_is_fatal() {
        let config = StorageConfig {
            backends: vec![backend("bare", None)],
            ..Default::default()
        };
        assert!(matches!(
            resolve(&config),
            Err(ConfigError::MissingField { field: "kind", .. })
        ));
    }

    #[test]
    fn invalid_host_is_fatal() {
        let config = StorageConfig {
            host: "Has/Slash".into(),
            ..Default::default()
        };
        assert!(matches!(resolve(&config), Err(ConfigError::InvalidName(_))));
    }

    #[test]
    fn revision_tracks_document_text() {
        let a = ConfigRevision::of_document("host = \"a\"");
        let b = ConfigRevision::of_document("host = \"b\"");
        assert_ne!(a, b);
        assert_eq!(a, ConfigRevision::of_document("host = \"a\""));
        assert_eq!(a.as_str().len(), 16);
    }
}
