use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHash;
use crate::ids::BlobInfoId;
use crate::names::validate_identifier;

/// Identifier of the storage host (cluster) that issued a locator.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostId(String);

impl HostId {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        validate_identifier("host id", &value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HostId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HostId> for String {
    fn from(id: HostId) -> Self {
        id.0
    }
}

impl fmt::Debug for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostId({})", self.0)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a stored blob within its namespace.
///
/// Blob ids are allocated as `{prefix}{time-ordered id}` and double as the
/// relative path of the blob inside its backend, so they are restricted to
/// path-safe characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        let invalid = |reason: &str| TypeError::InvalidName {
            kind: "blob id",
            value: value.clone(),
            reason: reason.to_string(),
        };
        if value.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        {
            return Err(invalid("contains a character outside [A-Za-z0-9._/-]"));
        }
        if value.starts_with('/') || value.contains("//") || value.contains("..") {
            return Err(invalid("is not a relative, normalized path"));
        }
        Ok(Self(value))
    }

    /// Allocate the blob id for a new metadata row.
    ///
    /// `prefix` is used verbatim; an empty prefix yields the bare id.
    pub fn with_prefix(prefix: &str, id: BlobInfoId) -> Result<Self, TypeError> {
        Self::new(format!("{prefix}{}", id.to_simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BlobId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable reference to exactly one stored blob.
///
/// Rendered as `host/blob-id`. The host never contains `/`, so the first
/// slash always separates the two parts.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobLocator {
    pub host: HostId,
    pub blob_id: BlobId,
}

impl BlobLocator {
    pub fn new(host: HostId, blob_id: BlobId) -> Self {
        Self { host, blob_id }
    }
}

impl FromStr for BlobLocator {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, blob_id) = s
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidLocator(s.to_string()))?;
        Ok(Self {
            host: HostId::new(host)?,
            blob_id: BlobId::new(blob_id)?,
        })
    }
}

impl TryFrom<String> for BlobLocator {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlobLocator> for String {
    fn from(locator: BlobLocator) -> Self {
        locator.to_string()
    }
}

impl fmt::Debug for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobLocator({self})")
    }
}

impl fmt::Display for BlobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.blob_id)
    }
}

/// One logical node among possibly many packed into a single blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Content hash of the node.
    pub hash: ContentHash,
    /// Blob the node is packed into.
    pub locator: BlobLocator,
    /// Index of the node in the blob's export list.
    pub export_idx: u32,
}

impl NodeHandle {
    pub fn new(hash: ContentHash, locator: BlobLocator, export_idx: u32) -> Self {
        Self {
            hash,
            locator,
            export_idx,
        }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.hash.short_hex(), self.locator, self.export_idx)
    }
}
