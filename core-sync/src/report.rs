//! # Sync Reports
//!
//! Terminal results of sync operations.
//!
//! ## Overview
//!
//! Public sync operations never return `Err`. Every failure is folded into a
//! [`SyncReport`] carrying a coarse [`SyncOutcome`], a success flag and a
//! human-readable message. Background runs hand their report back through a
//! [`SyncTicket`], which resolves exactly once.
//!
//! ## Outcomes
//!
//! ```text
//! upload ok,   download ok      → Completed
//! upload ok,   remote absent    → NothingToMerge
//! upload fail, download ok      → PartialSuccess   (still a success)
//! upload ok,   download fail    → DownloadFailed
//! upload fail, download fail    → Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of one sync cycle, attached to every log line of the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Operation and Outcome
// ============================================================================

/// Which public operation produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    History,
    Settings,
    All,
    BackupUpload,
    BackupDownload,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::History => "history",
            SyncOperation::Settings => "settings",
            SyncOperation::All => "all",
            SyncOperation::BackupUpload => "backup_upload",
            SyncOperation::BackupDownload => "backup_download",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse terminal state of a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Both directions succeeded
    Completed,
    /// Upload succeeded and there was no usable remote data
    NothingToMerge,
    /// Upload failed but the download and merge succeeded
    PartialSuccess,
    /// Upload succeeded but the download failed
    DownloadFailed,
    /// Nothing could be transferred
    Failed,
    /// Another sync was running; this request was dropped
    AlreadyInProgress,
    /// Required configuration is missing
    NotConfigured,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Completed | SyncOutcome::NothingToMerge | SyncOutcome::PartialSuccess
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Completed => "completed",
            SyncOutcome::NothingToMerge => "nothing_to_merge",
            SyncOutcome::PartialSuccess => "partial_success",
            SyncOutcome::DownloadFailed => "download_failed",
            SyncOutcome::Failed => "failed",
            SyncOutcome::AlreadyInProgress => "already_in_progress",
            SyncOutcome::NotConfigured => "not_configured",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Report
// ============================================================================

/// Counters gathered during a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Records or keys uploaded, when the upload succeeded
    pub uploaded: Option<usize>,
    pub inserted: usize,
    pub updated: usize,
    pub settings_applied: usize,
    pub settings_skipped: usize,
}

impl SyncStats {
    fn absorb(&mut self, other: &SyncStats) {
        self.uploaded = match (self.uploaded, other.uploaded) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.settings_applied += other.settings_applied;
        self.settings_skipped += other.settings_skipped;
    }
}

/// Terminal result of one public sync operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub operation: SyncOperation,
    pub outcome: SyncOutcome,
    pub message: String,
    pub stats: SyncStats,
}

impl SyncReport {
    pub fn new(operation: SyncOperation, outcome: SyncOutcome, message: impl Into<String>) -> Self {
        Self {
            operation,
            outcome,
            message: message.into(),
            stats: SyncStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: SyncStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn already_in_progress(operation: SyncOperation) -> Self {
        Self::new(
            operation,
            SyncOutcome::AlreadyInProgress,
            "A sync is already in progress",
        )
    }

    pub fn failed(operation: SyncOperation, message: impl Into<String>) -> Self {
        Self::new(operation, SyncOutcome::Failed, message)
    }

    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Fold the history and settings halves of a combined sync.
    ///
    /// Both succeeded: the weaker success wins. One failed: partial success.
    /// Both failed: failed.
    pub fn combine(history: SyncReport, settings: SyncReport) -> SyncReport {
        let outcome = match (history.success(), settings.success()) {
            (true, true) => {
                if history.outcome == SyncOutcome::PartialSuccess
                    || settings.outcome == SyncOutcome::PartialSuccess
                {
                    SyncOutcome::PartialSuccess
                } else if history.outcome == SyncOutcome::Completed
                    || settings.outcome == SyncOutcome::Completed
                {
                    SyncOutcome::Completed
                } else {
                    SyncOutcome::NothingToMerge
                }
            }
            (true, false) | (false, true) => SyncOutcome::PartialSuccess,
            (false, false) => {
                if history.outcome == SyncOutcome::NotConfigured {
                    SyncOutcome::NotConfigured
                } else {
                    SyncOutcome::Failed
                }
            }
        };

        let mut stats = history.stats;
        stats.absorb(&settings.stats);

        SyncReport {
            operation: SyncOperation::All,
            outcome,
            message: format!("history: {}; settings: {}", history.message, settings.message),
            stats,
        }
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// Handle to a sync operation's terminal report.
///
/// Blocking runs return `Finished`; background runs return `Pending` and
/// deliver through a oneshot channel. The caller decides which context
/// consumes the report.
#[derive(Debug)]
pub enum SyncTicket {
    Finished(SyncReport),
    Pending {
        operation: SyncOperation,
        receiver: oneshot::Receiver<SyncReport>,
    },
}

impl SyncTicket {
    /// Wait for the terminal report
    pub async fn wait(self) -> SyncReport {
        match self {
            SyncTicket::Finished(report) => report,
            SyncTicket::Pending {
                operation,
                receiver,
            } => receiver.await.unwrap_or_else(|_| {
                SyncReport::failed(operation, "Background sync task ended without a result")
            }),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SyncTicket::Pending { .. })
    }
}
