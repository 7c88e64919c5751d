use stash_config::ConfigError;

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The path escapes the backend root or is otherwise malformed.
    #[error("invalid blob path: {0:?}")]
    InvalidPath(String),

    /// The configured backend kind cannot be constructed by this build.
    #[error("unsupported backend {id:?}: {reason}")]
    Unsupported { id: String, reason: String },

    /// The configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
