//! Netboot service errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory_client::InventoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootError {
    /// No hardware record matches the client
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inventory unreachable or timed out
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),

    /// Request body or parameters could not be decoded
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// The request is valid but this service has nothing to offer for it
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Profiling error: {0}")]
    Profiling(#[from] pprof::Error),
}

impl From<InventoryError> for BootError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(msg) => BootError::NotFound(msg),
            other => BootError::Unavailable(other.to_string()),
        }
    }
}

impl BootError {
    /// HTTP status a request failing with this error is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BootError::NotFound(_) | BootError::Unsupported(_) => StatusCode::NOT_FOUND,
            BootError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BootError::Malformed(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BootError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}
