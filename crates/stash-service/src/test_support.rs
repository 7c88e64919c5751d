use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use stash_backend::{DefaultBackendFactory, InMemoryBackend};
use stash_bundle::{encode_bundle, BundleExport, BundleHeader};
use stash_config::{BackendConfig, BackendKind, ConfigRevision, NamespaceConfig, StorageConfig};
use stash_types::{BlobLocator, ContentHash, ManualClock, NamespaceId, NodeHandle};

use crate::service::StorageService;

pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub factory: Arc<DefaultBackendFactory>,
    pub service: StorageService,
}

impl Harness {
    pub fn backend(&self, id: &str) -> Arc<InMemoryBackend> {
        self.factory.memory_backend(id).unwrap()
    }

    pub fn node(&self, locator: &BlobLocator, index: u32) -> NodeHandle {
        NodeHandle::new(node_hash(index), locator.clone(), index)
    }
}

pub(crate) fn node_hash(index: u32) -> ContentHash {
    ContentHash::of(format!("node-{index}").as_bytes())
}

/// `default` on a plain memory backend, `uploads` on one that issues
/// redirect URLs. Import delay 60s, no GC delay, GC due on every tick.
pub(crate) fn config(aliases: bool) -> StorageConfig {
    let ns = |id: &str, backend: &str| {
        let mut config = NamespaceConfig::new(NamespaceId::new(id).unwrap(), backend);
        config.enable_aliases = aliases;
        config.gc_frequency_hours = 0.0;
        config.gc_delay_hours = 0.0;
        config
    };
    let mut doc = StorageConfig {
        host: "stash-1".into(),
        backends: vec![
            BackendConfig {
                kind: Some(BackendKind::Memory),
                ..BackendConfig::new("mem")
            },
            BackendConfig {
                base: Some("mem".into()),
                enable_redirects: Some(true),
                ..BackendConfig::new("mem-redirect")
            },
        ],
        namespaces: vec![ns("default", "mem"), ns("uploads", "mem-redirect")],
        ..Default::default()
    };
    doc.gc.import_delay_secs = 60;
    doc
}

pub(crate) fn harness(aliases: bool) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let factory = Arc::new(DefaultBackendFactory::new());
    let service = StorageService::in_memory(
        &config(aliases),
        ConfigRevision::new("r1"),
        factory.clone(),
        clock.clone(),
    )
    .unwrap();
    Harness {
        clock,
        factory,
        service,
    }
}

/// A bundle importing `imports` and exporting `(alias, index)` nodes.
pub(crate) fn bundle(imports: &[&BlobLocator], exports: &[(Option<&str>, u32)]) -> Bytes {
    let header = BundleHeader::new(
        imports.iter().map(|l| (*l).clone()).collect(),
        exports
            .iter()
            .map(|(alias, index)| BundleExport {
                hash: node_hash(*index),
                alias: alias.map(str::to_string),
                index: *index,
            })
            .collect(),
    );
    Bytes::from(encode_bundle(&header, b"payload"))
}
