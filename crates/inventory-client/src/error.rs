//! Inventory client errors

use thiserror::Error;

/// Errors that can occur when talking to the hardware inventory
#[derive(Debug, Error)]
pub enum InventoryError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Inventory API returned an error
    #[error("Inventory API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid token, expired, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No record matches the lookup
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend unreachable, timed out or failing server-side
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl InventoryError {
    /// True when the backend answered but has no matching record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classify a transport failure. Connection and timeout errors mean the
    /// backend is unreachable, everything else is kept as an HTTP error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
