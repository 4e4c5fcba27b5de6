//! Public-Code Backend
//!
//! Implements `RemoteBackend` for account-less sync: a shared sync code maps
//! to a folder under a public read endpoint. Any device that knows the code
//! can download; uploading additionally needs a write token.
//!
//! # Example
//!
//! ```ignore
//! use provider_synccode::SyncCodeBackend;
//! use std::sync::Arc;
//!
//! let backend = SyncCodeBackend::new(Arc::new(http_client), &code_config);
//! if !backend.can_write() {
//!     // download-only device
//! }
//! ```

mod backend;
mod error;

pub use backend::SyncCodeBackend;
pub use error::{Result, SyncCodeError};
