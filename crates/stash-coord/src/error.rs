use thiserror::Error;

/// Errors from coordination operations.
#[derive(Debug, Error)]
pub enum CoordError {
    /// A stored value could not be interpreted.
    #[error("corrupted data in {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The coordination backend could not be reached.
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),
}

pub type CoordResult<T> = Result<T, CoordError>;
