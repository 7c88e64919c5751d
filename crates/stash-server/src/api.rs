//! JSON request and response bodies.
//!
//! Hashes travel as lowercase hex and locators as `host/blob_id` strings.

use serde::{Deserialize, Serialize};
use stash_service::NodeHandle;
use stash_types::{BlobLocator, ContentHash, TypeError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub host: String,
    pub instance: String,
    pub revision: String,
    pub namespaces: Vec<String>,
}

/// A node reference on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBody {
    pub hash: String,
    pub locator: String,
    pub export_idx: u32,
}

impl From<&NodeHandle> for NodeBody {
    fn from(node: &NodeHandle) -> Self {
        Self {
            hash: node.hash.to_hex(),
            locator: node.locator.to_string(),
            export_idx: node.export_idx,
        }
    }
}

impl TryFrom<NodeBody> for NodeHandle {
    type Error = TypeError;

    fn try_from(body: NodeBody) -> Result<Self, Self::Error> {
        Ok(NodeHandle::new(
            ContentHash::from_hex(&body.hash)?,
            body.locator.parse::<BlobLocator>()?,
            body.export_idx,
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBlobBody {
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodesBody {
    pub nodes: Vec<NodeBody>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRefRequest {
    pub target: NodeBody,
    /// Seconds until expiry; omitted for a permanent ref.
    #[serde(default)]
    pub lifetime_secs: Option<u64>,
    #[serde(default = "default_extend")]
    pub extend: bool,
}

fn default_extend() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefBody {
    pub name: String,
    pub target: NodeBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub offset: Option<u64>,
    pub length: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AliasQuery {
    pub alias: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct StalenessQuery {
    pub staleness_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_body_uses_hex() {
        let node = NodeHandle::new(ContentHash::of(b"n"), "h/b1".parse().unwrap(), 3);
        let body = NodeBody::from(&node);
        assert_eq!(body.hash.len(), 64);
        assert_eq!(body.locator, "h/b1");
        assert_eq!(NodeHandle::try_from(body).unwrap(), node);
    }

    #[test]
    fn bad_hash_rejected() {
        let body = NodeBody {
            hash: "zz".into(),
            locator: "h/b1".into(),
            export_idx: 0,
        };
        assert!(NodeHandle::try_from(body).is_err());
    }

    #[test]
    fn write_ref_defaults() {
        let req: WriteRefRequest = serde_json::from_str(
            r#"{"target":{"hash":"00","locator":"h/b","export_idx":0}}"#,
        )
        .unwrap();
        assert!(req.extend);
        assert_eq!(req.lifetime_secs, None);
    }
}
