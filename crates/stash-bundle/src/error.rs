use stash_backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    /// The data does not start with the bundle magic.
    #[error("not a bundle")]
    NotABundle,

    #[error("bundle header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: u64 },

    #[error("corrupt bundle header at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    /// The blob is not (yet) present in the backend.
    #[error("blob not found in backend: {0}")]
    BlobMissing(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::BlobMissing(_) | Self::Backend(_) | Self::Io(_)
        )
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
