use std::time::Duration;

use serde::{Deserialize, Serialize};
use stash_types::{BlobId, NamespaceId};

use crate::error::{ConfigError, ConfigResult};

fn default_gc_frequency_hours() -> f64 {
    2.0
}

fn default_gc_delay_hours() -> f64 {
    6.0
}

/// Claims allowed to read or write a namespace.
///
/// Carried through configuration for the access-control layer; stash
/// itself does not enforce it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    pub read: Vec<String>,
    pub write: Vec<String>,
}

/// Configuration of one storage tenant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    pub id: NamespaceId,
    /// Id of the backend that stores this namespace's blobs.
    pub backend: String,
    /// Key prefix prepended to every blob path in the backend.
    #[serde(default)]
    pub prefix: String,
    /// Index exported aliases so nodes can be found by name.
    #[serde(default)]
    pub enable_aliases: bool,
    /// How often the garbage collector visits this namespace.
    #[serde(default = "default_gc_frequency_hours")]
    pub gc_frequency_hours: f64,
    /// Grace period before a queued GC check may be acted on.
    #[serde(default = "default_gc_delay_hours")]
    pub gc_delay_hours: f64,
    #[serde(default)]
    pub access: AccessPolicy,
}

impl NamespaceConfig {
    pub fn new(id: NamespaceId, backend: impl Into<String>) -> Self {
        Self {
            id,
            backend: backend.into(),
            prefix: String::new(),
            enable_aliases: false,
            gc_frequency_hours: default_gc_frequency_hours(),
            gc_delay_hours: default_gc_delay_hours(),
            access: AccessPolicy::default(),
        }
    }

    pub fn gc_frequency(&self) -> Duration {
        hours(self.gc_frequency_hours)
    }

    pub fn gc_delay(&self) -> Duration {
        hours(self.gc_delay_hours)
    }

    /// Path of a blob inside this namespace's backend.
    pub fn blob_path(&self, blob_id: &BlobId) -> String {
        format!("{}{}.blob", self.prefix, blob_id)
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        let field = |name: &str| format!("namespaces.{}.{name}", self.id);
        if !self.gc_frequency_hours.is_finite() || self.gc_frequency_hours <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: field("gc_frequency_hours"),
                reason: "must be a positive number of hours".into(),
            });
        }
        if !self.gc_delay_hours.is_finite() || self.gc_delay_hours < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: field("gc_delay_hours"),
                reason: "must be zero or a positive number of hours".into(),
            });
        }
        let prefix_ok = self
            .prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
            && !self.prefix.starts_with('/')
            && !self.prefix.contains("..")
            && !self.prefix.contains("//");
        if !prefix_ok {
            return Err(ConfigError::InvalidValue {
                field: field("prefix"),
                reason: format!("{:?} is not a relative, path-safe prefix", self.prefix),
            });
        }
        Ok(())
    }
}

fn hours(value: f64) -> Duration {
    Duration::try_from_secs_f64(value * 3600.0).unwrap_or_default()
}
