use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host settings store rejected a read or write.
    #[error("Settings store error for '{key}': {source}")]
    Settings {
        key: String,
        #[source]
        source: BridgeError,
    },

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn settings(key: &str, source: BridgeError) -> Self {
        Error::Settings {
            key: key.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
