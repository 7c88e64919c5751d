use stash_backend::BackendError;
use stash_gc::GcError;
use stash_meta::MetaError;
use stash_refs::RefError;
use stash_types::{BlobLocator, NamespaceId, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(NamespaceId),

    #[error("blob {locator} not found in namespace {namespace}")]
    BlobNotFound {
        namespace: NamespaceId,
        locator: BlobLocator,
    },

    #[error("namespace {0} cannot issue upload urls; a payload is required")]
    PayloadRequired(NamespaceId),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("alias indexing is disabled for namespace {0}")]
    AliasesDisabled(NamespaceId),

    #[error("invalid input: {0}")]
    InvalidInput(#[from] TypeError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("metadata error: {0}")]
    Meta(#[from] MetaError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("gc error: {0}")]
    Gc(#[from] GcError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
