use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use stash_service::{BackendError, MetaError, RefError, ServiceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Service(e) => service_status(e),
        }
    }
}

fn service_status(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::NamespaceNotFound(_) | ServiceError::BlobNotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::PayloadRequired(_) | ServiceError::AliasesDisabled(_) | ServiceError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ServiceError::Backend(BackendError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
        ServiceError::Backend(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Ref(RefError::BlobNotFound { .. }) => StatusCode::CONFLICT,
        ServiceError::Meta(e) | ServiceError::Ref(RefError::Meta(e)) => meta_status(e),
        ServiceError::Ref(_) | ServiceError::Gc(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn meta_status(error: &MetaError) -> StatusCode {
    match error {
        MetaError::DuplicateBlob(_) | MetaError::DuplicateLocator { .. } => StatusCode::CONFLICT,
        MetaError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
