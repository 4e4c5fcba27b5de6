//! # Update Downloads
//!
//! Fetches release artifacts from whichever mirror is currently reachable.
//!
//! ## Components
//!
//! - **Fetch** (`fetch`): Streamed download with retry, fallback URL and cancellation
//! - **Verify** (`verify`): Size, package header and SHA-256 checks
//! - **Mirror** (`mirror`): Latency-based choice between two endpoints, cached for a day
//! - **Release** (`release`): Artifact URL layout and jsDelivr rewriting

pub mod error;
pub mod fetch;
pub mod mirror;
pub mod release;
pub mod verify;

pub use error::{FetchError, Result};
pub use fetch::{
    DownloadJob, FetchEvent, FetchHandle, FetchListener, FetchOutcome, FetchProgress,
    ResilientFetcher,
};
pub use mirror::{MirrorSelector, ProbeResult};
pub use release::{to_jsdelivr, Channel, ReleaseSource};
pub use verify::{sha256_hex, verify_download, Expectations, PayloadKind, PACKAGE_MAGIC};
