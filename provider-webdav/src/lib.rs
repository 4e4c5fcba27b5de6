//! WebDAV Account Backend
//!
//! Implements the `RemoteBackend` trait for generic WebDAV servers
//! (Nextcloud, Jianguoyun, Apache mod_dav, ...) authenticated with a username
//! and password.
//!
//! # Features
//!
//! - Existence checks via `HEAD` (only `404` reads as "absent")
//! - Whole-file `GET` / `PUT`
//! - Collection listing via `PROPFIND` with `Depth: 1`
//! - Collection creation via `MKCOL`
//!
//! # Example
//!
//! ```ignore
//! use provider_webdav::WebDavBackend;
//! use std::sync::Arc;
//!
//! let backend = WebDavBackend::new(Arc::new(http_client), &account_config);
//! let entries = backend.list(&backend.container_path()).await?;
//! ```

mod backend;
mod error;
mod propfind;

pub use backend::WebDavBackend;
pub use error::{Result, WebDavError};
pub use propfind::parse_multistatus;
