use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_types::clock::{add_duration, sub_duration};
use stash_types::{BlobInfoId, BlobLocator, ContentHash, NamespaceId, NodeHandle, RefName};

/// A node exported by a blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobExport {
    pub hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub index: u32,
}

/// Metadata row for one stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub id: BlobInfoId,
    pub namespace: NamespaceId,
    pub locator: BlobLocator,
    pub created_at: DateTime<Utc>,
    /// Blobs this blob depends on. `None` until the import-graph computer
    /// has parsed the blob header.
    pub imports: Option<Vec<BlobInfoId>>,
    /// Exported nodes. Recorded only for namespaces with alias indexing.
    pub exports: Option<Vec<BlobExport>>,
}

impl BlobInfo {
    /// A fresh row with no computed graph.
    pub fn new(id: BlobInfoId, namespace: NamespaceId, locator: BlobLocator) -> Self {
        Self {
            id,
            namespace,
            locator,
            created_at: id.created_at(),
            imports: None,
            exports: None,
        }
    }

    pub fn imports_computed(&self) -> bool {
        self.imports.is_some()
    }

    /// Handles for exported nodes carrying `alias`.
    pub fn nodes_with_alias(&self, alias: &str) -> Vec<NodeHandle> {
        self.exports
            .iter()
            .flatten()
            .filter(|e| e.alias.as_deref() == Some(alias))
            .map(|e| NodeHandle::new(e.hash, self.locator.clone(), e.index))
            .collect()
    }
}

/// A named pointer to a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefInfo {
    pub namespace: NamespaceId,
    pub name: RefName,
    pub target: NodeHandle,
    /// Row of the blob holding `target`.
    pub blob_info_id: BlobInfoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Lifetime re-applied when a read renews the ref.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<Duration>,
}

impl RefInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether a read at `now` should push the expiry out.
    ///
    /// True once three quarters of the lifetime have elapsed, i.e. inside
    /// the last quarter before `expires_at`.
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        match (self.expires_at, self.lifetime) {
            (Some(at), Some(lifetime)) => {
                let window_start = sub_duration(at, lifetime / 4);
                now >= window_start && now < at
            }
            _ => false,
        }
    }

    /// Expiry after renewing at `now`.
    pub fn renewed_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lifetime.map(|lifetime| add_duration(now, lifetime))
    }
}

/// Garbage-collection progress for one namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceGcState {
    pub namespace: NamespaceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

/// Durable progress markers shared by the background tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcState {
    /// Every row below this id has had its imports scanned at least once.
    pub last_import_cursor: BlobInfoId,
    pub namespaces: Vec<NamespaceGcState>,
}

impl Default for GcState {
    fn default() -> Self {
        Self {
            last_import_cursor: BlobInfoId::nil(),
            namespaces: Vec::new(),
        }
    }
}

impl GcState {
    pub fn namespace(&self, id: &NamespaceId) -> Option<&NamespaceGcState> {
        self.namespaces.iter().find(|n| &n.namespace == id)
    }
}
