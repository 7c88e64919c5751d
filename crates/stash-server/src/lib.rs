//! HTTP server for stash.
//!
//! Exposes the [`StorageService`](stash_service::StorageService) façade
//! over JSON and raw-byte endpoints under `/v1`. Blob payloads travel as
//! request and response bodies; hashes and locators travel as strings.

pub mod api;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use api::{HealthResponse, InfoResponse, NodeBody, RefBody, WriteBlobBody, WriteRefRequest};
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::StashServer;
