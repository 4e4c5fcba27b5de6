use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Network or protocol failure talking to a remote endpoint.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote explicitly reported that the resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write credential is missing or was rejected. Never retried.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether a caller may reasonably try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Transport(_) | BridgeError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
