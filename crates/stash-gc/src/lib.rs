//! Background reclamation for stash.
//!
//! Two independent tickers keep storage bounded:
//!
//! - [`ImportComputer`] parses the header of every blob old enough to have
//!   finished uploading and records which blobs it imports.
//! - [`GarbageCollector`] drains each namespace's check queue under a
//!   lease and deletes rows nothing references.
//!
//! # Design Rules
//!
//! 1. A blob whose imports were never computed is never deleted.
//! 2. Only one instance collects a namespace at a time; the lease carries a
//!    fencing token and is renewed once half spent.
//! 3. Deleting a blob queues the blobs it imported, one score step later,
//!    so collection proceeds down the import graph.
//! 4. Progress (import cursor, queue, last run) is persisted as it happens,
//!    so an interrupted tick resumes on the next one.

pub mod collector;
pub mod error;
pub mod imports;

pub use collector::{CollectSummary, GarbageCollector};
pub use error::{GcError, GcResult};
pub use imports::{ImportComputer, ImportSummary};
