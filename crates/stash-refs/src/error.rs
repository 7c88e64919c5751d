use stash_coord::CoordError;
use stash_meta::MetaError;
use stash_types::{BlobLocator, NamespaceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefError {
    /// The ref target's blob is not registered in the namespace.
    #[error("blob {locator} not found in namespace {namespace}")]
    BlobNotFound {
        namespace: NamespaceId,
        locator: BlobLocator,
    },

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Coord(#[from] CoordError),
}

pub type RefResult<T> = Result<T, RefError>;
