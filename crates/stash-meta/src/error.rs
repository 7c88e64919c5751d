use stash_types::{BlobInfoId, BlobLocator, NamespaceId};
use thiserror::Error;

/// Errors from metadata store operations.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("blob row already exists: {0}")]
    DuplicateBlob(BlobInfoId),

    #[error("locator {locator} already registered in namespace {namespace}")]
    DuplicateLocator {
        namespace: NamespaceId,
        locator: BlobLocator,
    },

    /// The backing database failed.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

pub type MetaResult<T> = Result<T, MetaError>;
