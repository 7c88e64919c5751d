//! End-to-end behaviour of the façade with every background pass driven
//! by hand against a manual clock.

use std::time::Duration;

use bytes::Bytes;
use stash_backend::read_to_bytes;
use stash_config::ConfigRevision;
use stash_meta::BlobInfo;
use stash_refs::{RefError, RefOptions};
use stash_types::{BlobLocator, Clock, ContentHash, NamespaceId, NodeHandle, RefName};

use crate::error::ServiceError;
use crate::service::{ByteRange, ReadBlobResponse};
use crate::test_support::{bundle, config, harness, node_hash, Harness};

fn default_ns() -> NamespaceId {
    NamespaceId::new("default").unwrap()
}

fn uploads_ns() -> NamespaceId {
    NamespaceId::new("uploads").unwrap()
}

fn name(s: &str) -> RefName {
    RefName::new(s).unwrap()
}

async fn read_all(h: &Harness, ns: &NamespaceId, locator: &BlobLocator) -> Bytes {
    match h.service.read_blob(ns, locator, None).await.unwrap() {
        ReadBlobResponse::Stream(reader) => read_to_bytes(reader).await.unwrap(),
        ReadBlobResponse::Redirect(url) => panic!("unexpected redirect to {url}"),
    }
}

async fn row(h: &Harness, ns: &NamespaceId, locator: &BlobLocator) -> Option<BlobInfo> {
    h.service
        .metadata()
        .find_blob_by_locator(ns, locator)
        .await
        .unwrap()
}

/// Let the import delay pass and compute every pending graph.
async fn settle_imports(h: &Harness) {
    h.clock.advance(Duration::from_secs(61));
    let summary = h.service.run_import_pass().await.unwrap();
    assert!(summary.completed);
}

/// Step past the last run so the namespace is due again, then collect.
async fn collect(h: &Harness) -> stash_gc::CollectSummary {
    h.clock.advance(Duration::from_secs(1));
    h.service.run_gc_pass().await.unwrap()
}

// ---------------------------------------------------------------------------
// Blobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn payloads_read_back_unchanged() {
    let h = harness(false);
    let payloads: Vec<Bytes> = vec![
        Bytes::new(),
        Bytes::from_static(b"x"),
        Bytes::from(vec![0u8; 70_000]),
        bundle(&[], &[(Some("a"), 0)]),
    ];
    for payload in payloads {
        let written = h.service.write_blob(&default_ns(), Some(payload.clone())).await.unwrap();
        assert!(written.upload_url.is_none());
        assert_eq!(written.locator.host.as_str(), "stash-1");
        assert_eq!(read_all(&h, &default_ns(), &written.locator).await, payload);
    }
}

#[tokio::test]
async fn ranged_read_returns_window() {
    let h = harness(false);
    let written = h
        .service
        .write_blob(&default_ns(), Some(Bytes::from_static(b"0123456789")))
        .await
        .unwrap();
    let range = ByteRange { offset: 3, length: 4 };
    let response = h.service.read_blob(&default_ns(), &written.locator, Some(range)).await.unwrap();
    let ReadBlobResponse::Stream(reader) = response else {
        panic!("ranged reads stream");
    };
    assert_eq!(read_to_bytes(reader).await.unwrap(), Bytes::from_static(b"3456"));
}

#[tokio::test]
async fn unknown_namespace_and_blob_are_reported() {
    let h = harness(false);
    let missing = NamespaceId::new("nope").unwrap();
    let err = h.service.write_blob(&missing, Some(Bytes::new())).await.unwrap_err();
    assert!(matches!(err, ServiceError::NamespaceNotFound(_)));

    let locator: BlobLocator = "stash-1/never-written".parse().unwrap();
    let err = h.service.read_blob(&default_ns(), &locator, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::BlobNotFound { .. }));
}

#[tokio::test]
async fn upload_url_flow() {
    let h = harness(false);
    let err = h.service.write_blob(&default_ns(), None).await.unwrap_err();
    assert!(matches!(err, ServiceError::PayloadRequired(_)));

    let written = h.service.write_blob(&uploads_ns(), None).await.unwrap();
    let url = written.upload_url.unwrap();
    assert!(url.starts_with("memory://mem-redirect/upload/"));
    assert!(row(&h, &uploads_ns(), &written.locator).await.is_some());

    // Nothing to serve until the upload completes.
    let err = h.service.read_blob(&uploads_ns(), &written.locator, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::BlobNotFound { .. }));

    let backend = h.backend("mem-redirect");
    let path = h
        .service
        .registry()
        .namespace(&uploads_ns())
        .unwrap()
        .blob_path(&written.locator.blob_id);
    assert!(backend.complete_upload(&path, Bytes::from_static(b"uploaded")));
    match h.service.read_blob(&uploads_ns(), &written.locator, None).await.unwrap() {
        ReadBlobResponse::Redirect(url) => assert!(url.ends_with(&path)),
        ReadBlobResponse::Stream(_) => panic!("redirect-capable backend should redirect"),
    }
}

#[tokio::test]
async fn unfinished_upload_is_never_collected() {
    let h = harness(false);
    let written = h.service.write_blob(&uploads_ns(), None).await.unwrap();
    settle_imports(&h).await;
    collect(&h).await;
    let info = row(&h, &uploads_ns(), &written.locator).await.unwrap();
    assert!(!info.imports_computed());
}

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alias_lookup_finds_exported_node() {
    let h = harness(true);
    let payload = bundle(&[], &[(Some("v0"), 0), (None, 1), (Some("v1"), 2)]);
    let written = h.service.write_blob(&default_ns(), Some(payload)).await.unwrap();

    let nodes = h.service.find_nodes_by_alias(&default_ns(), "v1").await.unwrap();
    assert_eq!(nodes, vec![NodeHandle::new(node_hash(2), written.locator.clone(), 2)]);
    assert!(h.service.find_nodes_by_alias(&default_ns(), "v9").await.unwrap().is_empty());
}

#[tokio::test]
async fn alias_lookup_requires_indexing() {
    let h = harness(false);
    h.service
        .write_blob(&default_ns(), Some(bundle(&[], &[(Some("v1"), 2)])))
        .await
        .unwrap();
    let err = h.service.find_nodes_by_alias(&default_ns(), "v1").await.unwrap_err();
    assert!(matches!(err, ServiceError::AliasesDisabled(_)));
}

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hello_through_a_ref() {
    let h = harness(false);
    let written = h
        .service
        .write_blob(&default_ns(), Some(Bytes::from_static(b"hello")))
        .await
        .unwrap();
    let node = NodeHandle::new(ContentHash::of(b"hello"), written.locator.clone(), 0);
    h.service
        .write_ref(&default_ns(), &name("latest"), node.clone(), RefOptions::default())
        .await
        .unwrap();

    let target = h.service.read_ref(&default_ns(), &name("latest"), None).await.unwrap().unwrap();
    assert_eq!(target, node);
    assert_eq!(read_all(&h, &default_ns(), &target.locator).await, Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn ref_to_unknown_blob_is_rejected() {
    let h = harness(false);
    let locator: BlobLocator = "stash-1/ghost".parse().unwrap();
    let err = h
        .service
        .write_ref(&default_ns(), &name("r"), NodeHandle::new(node_hash(0), locator, 0), RefOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Ref(RefError::BlobNotFound { .. })));
}

#[tokio::test]
async fn ref_lifetime_extends_on_late_read_and_lapses_otherwise() {
    let h = harness(false);
    let written = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"b"))).await.unwrap();
    let node = h.node(&written.locator, 0);
    let lifetime = Duration::from_secs(100);
    let start = h.clock.now();
    for ref_name in ["read", "unread"] {
        h.service
            .write_ref(&default_ns(), &name(ref_name), node.clone(), RefOptions::expiring(lifetime))
            .await
            .unwrap();
    }

    h.clock.advance(Duration::from_secs(80));
    let target = h.service.read_ref(&default_ns(), &name("read"), None).await.unwrap();
    assert_eq!(target, Some(node.clone()));
    let renewed = h
        .service
        .metadata()
        .get_ref(&default_ns(), &name("read"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renewed.expires_at, Some(h.clock.now() + chrono::Duration::seconds(100)));
    assert_eq!(renewed.target, node);

    // Just past the original lifetime: only the unread ref lapses.
    h.clock.set(start + chrono::Duration::seconds(101));
    let summary = h.service.run_ref_expiry().await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(h.service.read_ref(&default_ns(), &name("unread"), None).await.unwrap(), None);
    assert_eq!(h.service.read_ref(&default_ns(), &name("read"), None).await.unwrap(), Some(node));
}

#[tokio::test]
async fn delete_ref_reports_existence() {
    let h = harness(false);
    let written = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"b"))).await.unwrap();
    h.service
        .write_ref(&default_ns(), &name("r"), h.node(&written.locator, 0), RefOptions::default())
        .await
        .unwrap();
    assert!(h.service.delete_ref(&default_ns(), &name("r")).await.unwrap());
    assert!(!h.service.delete_ref(&default_ns(), &name("r")).await.unwrap());
    assert_eq!(h.service.read_ref(&default_ns(), &name("r"), None).await.unwrap(), None);
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_blob_is_collected_after_scan() {
    let h = harness(false);
    let written = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"garbage"))).await.unwrap();

    // Not scanned yet: untouchable.
    collect(&h).await;
    assert!(row(&h, &default_ns(), &written.locator).await.is_some());

    settle_imports(&h).await;
    let summary = collect(&h).await;
    assert_eq!(summary.deleted, 1);
    assert!(row(&h, &default_ns(), &written.locator).await.is_none());
    let err = h.service.read_blob(&default_ns(), &written.locator, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::BlobNotFound { .. }));
}

#[tokio::test]
async fn reachable_blobs_survive_collection() {
    let h = harness(false);
    let leaf = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"leaf"))).await.unwrap();
    let root = h
        .service
        .write_blob(&default_ns(), Some(bundle(&[&leaf.locator], &[(None, 0)])))
        .await
        .unwrap();
    h.service
        .write_ref(&default_ns(), &name("keep"), h.node(&root.locator, 0), RefOptions::default())
        .await
        .unwrap();

    settle_imports(&h).await;
    let summary = collect(&h).await;
    assert_eq!(summary.deleted, 0);
    assert!(row(&h, &default_ns(), &leaf.locator).await.is_some());
    assert!(row(&h, &default_ns(), &root.locator).await.is_some());

    // Dropping the ref releases the root, then the leaf it imported.
    h.service.delete_ref(&default_ns(), &name("keep")).await.unwrap();
    let summary = collect(&h).await;
    assert_eq!(summary.deleted, 2);
    assert!(row(&h, &default_ns(), &root.locator).await.is_none());
    assert!(row(&h, &default_ns(), &leaf.locator).await.is_none());
}

#[tokio::test]
async fn overwritten_ref_releases_previous_blob() {
    let h = harness(false);
    let b1 = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"one"))).await.unwrap();
    let b2 = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"two"))).await.unwrap();
    h.service
        .write_ref(&default_ns(), &name("r"), h.node(&b1.locator, 0), RefOptions::default())
        .await
        .unwrap();
    h.service
        .write_ref(&default_ns(), &name("r"), h.node(&b2.locator, 0), RefOptions::default())
        .await
        .unwrap();

    settle_imports(&h).await;
    let summary = collect(&h).await;
    assert_eq!(summary.deleted, 1);
    assert!(row(&h, &default_ns(), &b1.locator).await.is_none());
    assert!(row(&h, &default_ns(), &b2.locator).await.is_some());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_update_adds_namespaces_once_per_revision() {
    let h = harness(false);
    let before = h.service.write_blob(&default_ns(), Some(Bytes::from_static(b"d"))).await.unwrap();
    let mut doc = config(false);
    let mut extra = doc.namespaces[0].clone();
    extra.id = NamespaceId::new("extra").unwrap();
    doc.namespaces.push(extra);

    assert!(h.service.update_config(&doc, ConfigRevision::new("r2")).unwrap());
    assert!(!h.service.update_config(&doc, ConfigRevision::new("r2")).unwrap());
    let extra = NamespaceId::new("extra").unwrap();
    let written = h.service.write_blob(&extra, Some(Bytes::from_static(b"e"))).await.unwrap();
    assert_eq!(read_all(&h, &extra, &written.locator).await, Bytes::from_static(b"e"));

    // Same backend id, same memory backend: earlier blobs stay readable.
    assert_eq!(h.service.registry().revision().as_str(), "r2");
    assert_eq!(read_all(&h, &default_ns(), &before.locator).await, Bytes::from_static(b"d"));
}
