//! Configuration for stash.
//!
//! A single TOML document ([`StorageConfig`]) declares the storage host,
//! background task intervals, backends and namespaces. Backends may inherit
//! from a `base` backend; [`resolve`] walks every base chain, rejects cycles
//! and unknown references, and produces a [`ResolvedConfig`] in which every
//! namespace maps to exactly one fully merged [`BackendConfig`].
//!
//! Documents are tagged with an opaque [`ConfigRevision`] so that callers
//! only re-resolve when the document actually changed.

pub mod backend;
pub mod document;
pub mod error;
pub mod namespace;
pub mod resolve;

pub use backend::{BackendConfig, BackendKind, CredentialsMode};
pub use document::{GcSettings, RefCacheSettings, ServerSettings, StorageConfig};
pub use error::{ConfigError, ConfigResult};
pub use namespace::{AccessPolicy, NamespaceConfig};
pub use resolve::{resolve, ConfigRevision, ResolvedConfig, ResolvedNamespace};
