//! Storage façade for stash.
//!
//! [`StorageService`] is the one entry point transports talk to. It owns
//! the namespace registry, the ref store and the three background passes,
//! and [`BackgroundTasks`] runs those passes on their configured intervals.
//!
//! # Design Rules
//!
//! 1. Every operation resolves its namespace against the current registry
//!    snapshot; unknown namespaces are rejected before any I/O.
//! 2. A blob is registered in metadata only after its payload is stored,
//!    or once an upload URL has been issued for it.
//! 3. Background passes can also be run on demand, one at a time.

pub mod error;
pub mod service;
pub mod tasks;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod test_support;

pub use error::{ServiceError, ServiceResult};
pub use service::{ByteRange, ReadBlobResponse, StorageService, WriteBlobResponse};
pub use tasks::BackgroundTasks;

pub use stash_backend::BackendError;
pub use stash_meta::MetaError;
pub use stash_refs::{RefError, RefOptions};
pub use stash_types::{BlobLocator, NamespaceId, NodeHandle, RefName};
