use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The concrete provider behind a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Process-local storage, lost on restart.
    Memory,
    /// A directory on the local filesystem.
    FileSystem,
    /// A bucket in an object-storage provider.
    ObjectStore,
    /// Another stash host reached through a relay endpoint.
    Relay,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Memory => "memory",
            Self::FileSystem => "file-system",
            Self::ObjectStore => "object-store",
            Self::Relay => "relay",
        };
        f.write_str(s)
    }
}

/// How an object-store backend obtains credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    Default,
    Environment,
    InstanceProfile,
}

/// Declaration of one storage backend.
///
/// Every field except `id` and `base` is optional. A backend with a `base`
/// inherits each field it leaves unset from the fully resolved base.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BackendKind>,
    /// Root directory (file-system) or root key (object-store).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Path below `root` or inside `bucket` that holds blobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_endpoint: Option<String>,
    /// Hand out direct upload/download URLs when the backend supports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_redirects: Option<bool>,
}

impl BackendConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Copy every field left unset in `self` from an already resolved base.
    ///
    /// Fields explicitly set in `self` always win. `id` and `base` are never
    /// inherited.
    pub fn apply_defaults_from(&mut self, base: &BackendConfig) {
        fn inherit<T: Clone>(field: &mut Option<T>, base: &Option<T>) {
            if field.is_none() {
                field.clone_from(base);
            }
        }

        inherit(&mut self.kind, &base.kind);
        inherit(&mut self.root, &base.root);
        inherit(&mut self.bucket, &base.bucket);
        inherit(&mut self.bucket_path, &base.bucket_path);
        inherit(&mut self.region, &base.region);
        inherit(&mut self.credentials, &base.credentials);
        inherit(&mut self.relay_endpoint, &base.relay_endpoint);
        inherit(&mut self.enable_redirects, &base.enable_redirects);
    }

    pub fn redirects_enabled(&self) -> bool {
        self.enable_redirects.unwrap_or(false)
    }

    /// Directory holding blobs for file-system backends: `root/bucket_path`.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        let root = self.root.clone()?;
        Some(match &self.bucket_path {
            Some(path) => root.join(path),
            None => root,
        })
    }
}
