use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::BackendConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::namespace::NamespaceConfig;

/// The complete configuration document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Host id stamped into every locator this deployment issues.
    pub host: String,
    pub server: ServerSettings,
    pub gc: GcSettings,
    pub ref_cache: RefCacheSettings,
    pub backends: Vec<BackendConfig>,
    pub namespaces: Vec<NamespaceConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "local".into(),
            server: ServerSettings::default(),
            gc: GcSettings::default(),
            ref_cache: RefCacheSettings::default(),
            backends: Vec::new(),
            namespaces: Vec::new(),
        }
    }
}

impl StorageConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file. Returns the raw text alongside so the
    /// caller can derive a revision from it.
    pub fn load(path: &Path) -> ConfigResult<(Self, String)> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        Ok((config, text))
    }
}

/// Transport settings for the HTTP marshaller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
    /// Largest payload accepted inline by `WriteBlob`.
    pub max_blob_size: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7180)),
            max_blob_size: 256 * 1024 * 1024,
        }
    }
}

/// Intervals and limits for the background tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcSettings {
    /// How often the import-graph computer runs.
    pub blob_ticker_interval_secs: u64,
    /// Minimum age of a blob before its imports are computed. Gives blobs
    /// uploaded through a redirect URL time to land in the backend.
    pub import_delay_secs: u64,
    /// How often expired refs are swept.
    pub ref_ticker_interval_secs: u64,
    /// How often the collector checks for namespaces that are due.
    pub gc_ticker_interval_secs: u64,
    /// Lifetime of a namespace GC lease; renewed while a pass runs.
    pub lease_duration_secs: u64,
    /// How often the configuration file is re-read.
    pub config_poll_interval_secs: u64,
    /// Rows fetched per metadata query by the background tasks.
    pub page_size: usize,
    /// Initial number of bytes fetched when reading a bundle header.
    pub header_fetch_size: u64,
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            blob_ticker_interval_secs: 300,
            import_delay_secs: 1800,
            ref_ticker_interval_secs: 60,
            gc_ticker_interval_secs: 60,
            lease_duration_secs: 120,
            config_poll_interval_secs: 30,
            page_size: 256,
            header_fetch_size: 4096,
        }
    }
}

impl GcSettings {
    pub fn blob_ticker_interval(&self) -> Duration {
        Duration::from_secs(self.blob_ticker_interval_secs)
    }

    pub fn import_delay(&self) -> Duration {
        Duration::from_secs(self.import_delay_secs)
    }

    pub fn ref_ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ref_ticker_interval_secs)
    }

    pub fn gc_ticker_interval(&self) -> Duration {
        Duration::from_secs(self.gc_ticker_interval_secs)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn config_poll_interval(&self) -> Duration {
        Duration::from_secs(self.config_poll_interval_secs)
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        let checks = [
            ("gc.blob_ticker_interval_secs", self.blob_ticker_interval_secs),
            ("gc.ref_ticker_interval_secs", self.ref_ticker_interval_secs),
            ("gc.gc_ticker_interval_secs", self.gc_ticker_interval_secs),
            ("gc.lease_duration_secs", self.lease_duration_secs),
            ("gc.config_poll_interval_secs", self.config_poll_interval_secs),
            ("gc.page_size", self.page_size as u64),
            ("gc.header_fetch_size", self.header_fetch_size),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }
}

/// Process-local ref cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefCacheSettings {
    pub capacity: usize,
    /// Entries not accessed for this long are dropped.
    pub sliding_expiration_secs: u64,
}

impl Default for RefCacheSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            sliding_expiration_secs: 60,
        }
    }
}

impl RefCacheSettings {
    pub fn sliding_expiration(&self) -> Duration {
        Duration::from_secs(self.sliding_expiration_secs)
    }
}
