use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// Network or protocol failure; retried
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status; retried
    #[error("Download failed: HTTP {status}")]
    Http { status: u16 },

    /// Downloaded bytes failed verification; the file is deleted and the
    /// attempt retried
    #[error("Downloaded file failed verification: {0}")]
    Integrity(String),

    #[error("Download cancelled")]
    Cancelled,

    /// Local filesystem failure writing the destination
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid download job: {0}")]
    InvalidJob(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

impl From<BridgeError> for FetchError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Transport(msg) => FetchError::Transport(msg),
            BridgeError::Io(e) => FetchError::Io(e),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for FetchError {
    fn from(error: core_runtime::Error) -> Self {
        FetchError::InvalidJob(error.to_string())
    }
}
