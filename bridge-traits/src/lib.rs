//! # Host Bridge Traits
//!
//! Contracts between the sync core and the application hosting it. The core
//! owns no network stack, preferences store, worker pool or clock; each
//! arrives as a trait object implemented per platform.
//!
//! | Module | Trait | Desktop implementation |
//! |--------|-------|------------------------|
//! | [`http`] | [`HttpClient`] | `bridge_desktop::ReqwestHttpClient` |
//! | [`storage`] | [`SettingsStore`] | `bridge_desktop::SqliteSettingsStore` |
//! | [`storage`] | [`RemoteBackend`] | `provider-webdav`, `provider-synccode` |
//! | [`background`] | [`TaskDispatcher`] | `bridge_desktop::TokioTaskDispatcher` |
//! | [`time`] | [`Clock`] | [`SystemClock`] |
//! | [`logger`] | [`LoggerSink`] | host specific |
//!
//! ## Errors
//!
//! Every trait reports failures as [`BridgeError`]. Implementations map
//! network failures to `Transport`, explicit "missing" answers to `NotFound`
//! and rejected or absent credentials to `NotAuthorized`. The sync core relies
//! on that split: `NotFound` means "nothing to merge", `NotAuthorized` is
//! never retried.
//!
//! All traits are `Send + Sync` so one instance can be shared across tasks.

pub mod background;
pub mod error;
pub mod http;
pub mod logger;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use background::{TaskDispatcher, TaskFactory, TaskId, TaskStatus};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStream};
pub use logger::{LogEntry, LogLevel, LoggerSink};
pub use storage::{RemoteBackend, RemoteEntry, SettingsStore};
pub use time::{Clock, ManualClock, SystemClock};
