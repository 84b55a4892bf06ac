//! BIG-IP client errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BigIpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The device answers but its iControl APIs are not serving yet
    /// (still booting, or not licensed)
    #[error("iControl API not available: {0}")]
    ApiUnavailable(String),

    #[error("iControl API error: {0}")]
    Api(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),
}

impl BigIpError {
    /// Whether the control plane is reachable but not serving its APIs yet
    pub fn is_api_unavailable(&self) -> bool {
        matches!(self, BigIpError::ApiUnavailable(_))
    }

    /// Whether the request never reached the device (refused, timed out)
    pub fn is_transport(&self) -> bool {
        match self {
            BigIpError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
