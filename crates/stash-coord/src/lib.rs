//! Cross-instance coordination for stash.
//!
//! Several service instances may share one metadata store. They agree on
//! who collects which namespace through leases, and hand GC candidates to
//! each other through durable, score-ordered queues.
//!
//! - [`CoordinationService`] — the capability trait (queues + leases)
//! - [`InMemoryCoordination`] — single-process implementation driven by a
//!   [`Clock`](stash_types::Clock)
//! - [`GcQueue`] — typed view of the per-namespace GC check queues
//!
//! # Design Rules
//!
//! 1. A lease is held by at most one holder until it expires.
//! 2. Re-acquiring a lease you hold extends it and keeps its fencing token.
//! 3. A queue holds each member once; its score only moves forward.

pub mod error;
pub mod gc_queue;
pub mod memory;
pub mod traits;

pub use error::{CoordError, CoordResult};
pub use gc_queue::{score_at, GcQueue};
pub use memory::InMemoryCoordination;
pub use traits::{CoordinationService, Lease, QueueEntry};
