use stash_backend::BackendError;
use stash_coord::CoordError;
use stash_meta::MetaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcError {
    #[error("metadata store: {0}")]
    Meta(#[from] MetaError),

    #[error("coordination service: {0}")]
    Coord(#[from] CoordError),

    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

pub type GcResult<T> = Result<T, GcError>;
