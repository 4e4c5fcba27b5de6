use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Required configuration fields are absent. Raised before any network call.
    #[error("Sync not configured: {0}")]
    NotConfigured(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Write credential missing or rejected. Never retried.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Malformed remote payload: {0}")]
    MalformedPayload(String),

    #[error("History repository error: {0}")]
    Repository(String),

    #[error("Settings store error: {0}")]
    Settings(String),
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Transport(msg) => SyncError::Transport(msg),
            BridgeError::NotAuthorized(msg) => SyncError::NotAuthorized(msg),
            BridgeError::DatabaseError(msg) => SyncError::Repository(msg),
            BridgeError::NotAvailable(msg) => SyncError::NotConfigured(msg),
            other => SyncError::Transport(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::Config(msg) => SyncError::NotConfigured(msg),
            other => SyncError::Settings(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
