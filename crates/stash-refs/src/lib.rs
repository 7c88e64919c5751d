//! Named refs for stash.
//!
//! A ref is a mutable, namespaced pointer to one node. Refs may carry a
//! lifetime: they disappear once it elapses unless a read renews them.
//! While a ref exists, the blob holding its target is never collected.
//!
//! - [`RefStore`] — write, read and delete refs
//! - [`RefCache`] — process-local, fixed-capacity cache with sliding
//!   expiration and a per-read staleness bound
//! - [`RefExpirer`] — background sweep of expired refs
//!
//! # Design Rules
//!
//! 1. A ref can only target a blob that is registered in its namespace.
//! 2. Every write replaces the cache entry; writes are last-writer-wins.
//! 3. Expired refs are removed with a conditional delete, so a concurrent
//!    rewrite always survives.
//! 4. Dropping a ref, or pointing it elsewhere, queues the old blob for a
//!    GC check.

pub mod cache;
pub mod error;
pub mod expirer;
pub mod store;

pub use cache::{CachedRef, RefCache};
pub use error::{RefError, RefResult};
pub use expirer::{ExpirySummary, RefExpirer};
pub use store::{RefOptions, RefStore};
