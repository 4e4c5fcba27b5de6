//! Error types for the public-code backend

use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncCodeError {
    /// Upload attempted without a write token
    #[error("Uploading with a sync code requires a write token")]
    MissingWriteToken,

    /// The write endpoint rejected the token (401/403)
    #[error("HTTP {status}: write token rejected")]
    WriteRejected { status: u16 },

    #[error("HTTP 404 Not Found: {0}")]
    NotFound(String),

    /// Upload body cannot be embedded in a JSON write request
    #[error("Upload is not UTF-8 text: {0}")]
    InvalidPayload(String),

    #[error("HTTP {status} for {method} {url}")]
    UnexpectedStatus {
        status: u16,
        method: &'static str,
        url: String,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, SyncCodeError>;

impl From<SyncCodeError> for BridgeError {
    fn from(error: SyncCodeError) -> Self {
        match error {
            SyncCodeError::MissingWriteToken | SyncCodeError::WriteRejected { .. } => {
                BridgeError::NotAuthorized(error.to_string())
            }
            SyncCodeError::NotFound(_) => BridgeError::NotFound(error.to_string()),
            SyncCodeError::Bridge(inner) => inner,
            other => BridgeError::Transport(other.to_string()),
        }
    }
}
