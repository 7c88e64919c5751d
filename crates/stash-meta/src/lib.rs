//! Metadata store for stash.
//!
//! Holds one [`BlobInfo`] row per stored blob, one [`RefInfo`] per named
//! ref and the singleton [`GcState`]. The import graph recorded on blob rows
//! and the ref targets together decide what the garbage collector may
//! reclaim.
//!
//! # Storage Backends
//!
//! All stores implement the [`MetadataStore`] trait:
//!
//! - [`InMemoryMetadataStore`] — `BTreeMap`-based store for tests and
//!   single-process deployments
//!
//! # Design Rules
//!
//! 1. Blob rows are keyed by a time-ordered [`BlobInfoId`], so pending rows
//!    can be range-scanned by creation time.
//! 2. `(namespace, locator)` is unique; placeholders are created through
//!    [`MetadataStore::get_or_insert_blob`].
//! 3. Conditional ref operations (`delete_ref_if_expired`) re-check their
//!    condition under the store's own lock.
//!
//! [`BlobInfoId`]: stash_types::BlobInfoId

pub mod error;
pub mod memory;
pub mod records;
pub mod traits;

pub use error::{MetaError, MetaResult};
pub use memory::InMemoryMetadataStore;
pub use records::{BlobExport, BlobInfo, GcState, NamespaceGcState, RefInfo};
pub use traits::MetadataStore;
