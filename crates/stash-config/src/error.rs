use stash_types::TypeError;
use thiserror::Error;

/// Errors raised while loading or resolving configuration.
///
/// All of these are fatal for the document being resolved: a service never
/// starts serving (or switches to) a configuration that failed to resolve.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown backend {id:?} referenced by {referenced_by}")]
    UnknownBackend { id: String, referenced_by: String },

    #[error("backend base chain forms a cycle: {chain}")]
    BaseCycle { chain: String },

    #[error("duplicate backend id {0:?}")]
    DuplicateBackend(String),

    #[error("duplicate namespace id {0:?}")]
    DuplicateNamespace(String),

    #[error("backend {backend:?} has no {field} after inheritance")]
    MissingField { backend: String, field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error(transparent)]
    InvalidName(#[from] TypeError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
