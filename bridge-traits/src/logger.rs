//! Host log forwarding.
//!
//! The core logs through `tracing`. Hosts that want those events in their own
//! pipeline (Logcat, OSLog, a log file) implement [`LoggerSink`]; the runtime
//! logging layer turns each event into a [`LogEntry`] and hands it over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One event as seen by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_sync::orchestrator`
    pub target: String,
    pub message: String,
    /// Event fields, already redacted when redaction is enabled
    pub fields: BTreeMap<String, String>,
    /// Name of the innermost active span (`sync_cycle`, `fetch`, ...)
    pub span: Option<String>,
}

/// Receives log entries from the core.
///
/// Called synchronously on the thread that emitted the event, so
/// implementations must not block. Entries carry no credentials when the
/// runtime's redaction is on, but hosts should still apply their own privacy
/// policy.
pub trait LoggerSink: Send + Sync {
    fn log(&self, entry: LogEntry);

    /// Entries below this level are dropped before they are built
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}
