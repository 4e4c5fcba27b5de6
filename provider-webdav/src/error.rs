//! Error types for the WebDAV backend

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// WebDAV backend errors
#[derive(Error, Debug)]
pub enum WebDavError {
    /// Server rejected the credentials (401)
    #[error("HTTP 401 Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials accepted but access denied (403)
    #[error("HTTP 403 Forbidden: {0}")]
    Forbidden(String),

    /// Resource does not exist (404)
    #[error("HTTP 404 Not Found: {0}")]
    NotFound(String),

    /// Any other unexpected status
    #[error("HTTP {status} for {method} {url}")]
    UnexpectedStatus {
        status: u16,
        method: &'static str,
        url: String,
    },

    /// Malformed multistatus response
    #[error("Invalid PROPFIND response: {0}")]
    InvalidResponse(String),

    /// Bridge error
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for WebDAV operations
pub type Result<T> = std::result::Result<T, WebDavError>;

impl WebDavError {
    pub(crate) fn from_status(status: u16, method: &'static str, url: &str) -> Self {
        match status {
            401 => WebDavError::Unauthorized(format!("{} {}", method, url)),
            403 => WebDavError::Forbidden(format!("{} {}", method, url)),
            404 => WebDavError::NotFound(url.to_string()),
            _ => WebDavError::UnexpectedStatus {
                status,
                method,
                url: url.to_string(),
            },
        }
    }
}

// Status text is kept in the message so connection failures can be classified.
impl From<WebDavError> for BridgeError {
    fn from(error: WebDavError) -> Self {
        match error {
            WebDavError::NotFound(_) => BridgeError::NotFound(error.to_string()),
            WebDavError::Bridge(inner) => inner,
            other => BridgeError::Transport(other.to_string()),
        }
    }
}
