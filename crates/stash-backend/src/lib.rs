//! Byte-storage backends for stash.
//!
//! A backend stores opaque blobs under relative paths. It never interprets
//! blob contents; the metadata store and the import-graph computer do that.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`InMemoryBackend`] — `HashMap`-based store for tests, with optional
//!   simulated direct-upload URLs
//! - [`FileSystemBackend`] — one file per blob below a root directory
//!
//! # Wiring
//!
//! [`ClientRegistry`] turns a configuration document into a
//! namespace → backend map through a [`BackendFactory`], and swaps in a new
//! map only when the configuration revision changes.
//!
//! # Design Rules
//!
//! 1. A missing blob is `Ok(None)`, never an error.
//! 2. Writes are all-or-nothing from a reader's point of view.
//! 3. All I/O errors are propagated; retry policy belongs to the caller.

pub mod error;
pub mod factory;
pub mod fs;
pub mod memory;
pub mod registry;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use factory::{BackendFactory, DefaultBackendFactory};
pub use fs::FileSystemBackend;
pub use memory::InMemoryBackend;
pub use registry::{ClientRegistry, NamespaceClient, RegistrySnapshot};
pub use traits::{read_to_bytes, Backend, BlobReader};
