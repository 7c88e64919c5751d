//! Foundation types for stash.
//!
//! Every other stash crate depends on `stash-types`. It defines the
//! identifiers that flow between the metadata store, the ref store, the
//! garbage collector and the service façade.
//!
//! # Key Types
//!
//! - [`NamespaceId`] — a logical, independently configured storage tenant
//! - [`RefName`] — the name of a mutable pointer, unique per namespace
//! - [`ContentHash`] — BLAKE3 hash identifying a node inside a blob
//! - [`BlobLocator`] — `(host, blob id)` pair addressing one stored blob
//! - [`NodeHandle`] — `(hash, locator, export index)` addressing one node
//! - [`BlobInfoId`] — time-ordered metadata row id, range-scannable by creation time
//! - [`Clock`] — wall-clock abstraction so expiry and GC can be tested deterministically

pub mod clock;
pub mod error;
pub mod hash;
pub mod ids;
pub mod locator;
pub mod names;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use hash::ContentHash;
pub use ids::{BlobInfoId, BlobInfoIdGenerator};
pub use locator::{BlobId, BlobLocator, HostId, NodeHandle};
pub use names::{NamespaceId, RefName};
