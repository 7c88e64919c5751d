use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stash_config::{BackendConfig, BackendKind};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::fs::FileSystemBackend;
use crate::memory::InMemoryBackend;
use crate::traits::Backend;

/// Builds a live backend from its resolved configuration.
pub trait BackendFactory: Send + Sync {
    fn create(&self, config: &BackendConfig) -> BackendResult<Arc<dyn Backend>>;
}

/// Factory for the backend kinds this build ships with.
///
/// Memory backends are cached by id, so their contents survive a
/// configuration reload that keeps the same backend id.
#[derive(Default)]
pub struct DefaultBackendFactory {
    memory: Mutex<HashMap<String, Arc<InMemoryBackend>>>,
}

impl DefaultBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memory backend previously created for `id`, if any.
    pub fn memory_backend(&self, id: &str) -> Option<Arc<InMemoryBackend>> {
        self.memory.lock().expect("lock poisoned").get(id).cloned()
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, config: &BackendConfig) -> BackendResult<Arc<dyn Backend>> {
        let unsupported = |reason: &str| BackendError::Unsupported {
            id: config.id.clone(),
            reason: reason.to_string(),
        };
        match config.kind {
            Some(BackendKind::Memory) => {
                let mut cache = self.memory.lock().expect("lock poisoned");
                let backend = cache
                    .entry(config.id.clone())
                    .or_insert_with(|| {
                        debug!(backend = %config.id, "creating memory backend");
                        Arc::new(if config.redirects_enabled() {
                            InMemoryBackend::with_redirects(format!("memory://{}", config.id))
                        } else {
                            InMemoryBackend::new()
                        })
                    })
                    .clone();
                Ok(backend)
            }
            Some(BackendKind::FileSystem) => {
                let dir = config
                    .storage_dir()
                    .ok_or_else(|| unsupported("file-system backend requires `root`"))?;
                debug!(backend = %config.id, dir = %dir.display(), "creating file-system backend");
                Ok(Arc::new(FileSystemBackend::new(dir)))
            }
            Some(kind) => Err(unsupported(&format!("backend kind {kind} is not available in this build"))),
            None => Err(unsupported("backend kind is not set")),
        }
    }
}

impl std::fmt::Debug for DefaultBackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultBackendFactory")
            .field("memory_backends", &self.memory.lock().expect("lock poisoned").len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, kind: BackendKind) -> BackendConfig {
        BackendConfig {
            kind: Some(kind),
            ..BackendConfig::new(id)
        }
    }

    #[test]
    fn memory_backends_are_cached_by_id() {
        let factory = DefaultBackendFactory::new();
        let cfg = config("mem", BackendKind::Memory);
        let a = factory.create(&cfg).unwrap();
        let b = factory.create(&cfg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = factory.create(&config("mem2", BackendKind::Memory)).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
        assert!(factory.memory_backend("mem").is_some());
    }

    #[test]
    fn file_system_requires_root() {
        let factory = DefaultBackendFactory::new();
        let mut cfg = config("fs", BackendKind::FileSystem);
        assert!(matches!(factory.create(&cfg), Err(BackendError::Unsupported { .. })));

        let dir = tempfile::tempdir().unwrap();
        cfg.root = Some(dir.path().to_path_buf());
        assert!(factory.create(&cfg).is_ok());
    }

    #[test]
    fn unavailable_kinds_are_unsupported() {
        let factory = DefaultBackendFactory::new();
        for kind in [BackendKind::ObjectStore, BackendKind::Relay] {
            let err = factory.create(&config("x", kind)).err().unwrap();
            assert!(err.to_string().contains("not available"), "{err}");
        }
        assert!(factory.create(&BackendConfig::new("bare")).is_err());
    }

    #[tokio::test]
    async fn redirects_flag_reaches_memory_backend() {
        let factory = DefaultBackendFactory::new();
        let cfg = BackendConfig {
            enable_redirects: Some(true),
            ..config("direct", BackendKind::Memory)
        };
        let backend = factory.create(&cfg).unwrap();
        let url = backend.redirect_for_write("a.blob").await.unwrap().unwrap();
        assert_eq!(url, "memory://direct/upload/a.blob");
    }
}
