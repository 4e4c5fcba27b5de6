//! Workspace umbrella crate.
//!
//! Exposes feature flags that map to the individual workspace crates so host
//! applications can depend on `watchsync` alone:
//!
//! - `desktop-shims` (default): the sync service with reqwest, SQLite and
//!   Tokio adapters
//! - `updates`: resilient download and mirror selection for app updates

#[cfg(feature = "desktop-shims")]
pub use core_service::*;

#[cfg(feature = "updates")]
pub use core_update as update;
