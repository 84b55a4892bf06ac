//! OpenStack client errors

use thiserror::Error;

/// Errors that can occur when interacting with the OpenStack APIs
#[derive(Debug, Error)]
pub enum OpenStackError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An OpenStack service returned an error
    #[error("OpenStack API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Keystone rejected the credentials or returned no usable token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing catalog endpoint)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
