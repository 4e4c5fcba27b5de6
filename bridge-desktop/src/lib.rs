//! # Desktop Host
//!
//! Native implementations of the host contracts for macOS, Windows and Linux:
//!
//! - [`ReqwestHttpClient`]: rustls-backed `reqwest` client, WebDAV verbs included
//! - [`SqliteSettingsStore`]: preferences as JSON values in one SQLite table
//! - [`TokioTaskDispatcher`]: one-off and recurring jobs on the Tokio runtime
//!
//! ```ignore
//! let data_dir = bridge_desktop::default_data_dir();
//! let http = ReqwestHttpClient::new()?;
//! let settings = SqliteSettingsStore::new(data_dir.join("settings.db")).await?;
//! let dispatcher = TokioTaskDispatcher::new();
//! ```

mod background;
mod http;
mod settings;

pub use background::TokioTaskDispatcher;
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;

use std::path::PathBuf;

/// Per-user data directory for the desktop build.
///
/// Falls back to the working directory when the platform reports none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("watchsync")
}
