//! # Watch History Sync
//!
//! Keeps watch history and preferences converged across devices through a
//! passive remote file store.
//!
//! ## Overview
//!
//! Each device periodically uploads its full snapshot and merges the remote
//! snapshot back in. There is no server-side logic and no deletion
//! propagation: the merge is an additive last-writer-wins over
//! `(create_time, position)`.
//!
//! ## Components
//!
//! - **Model** (`model`): History records and keyed record sets
//! - **Merge** (`merge`): Pure freshness comparison producing insert/update batches
//! - **Repository** (`repository`): Local history persistence
//! - **Settings Sync** (`settings_sync`): Filtered union-merge of preferences
//! - **Orchestrator** (`orchestrator`): Upload-then-download cycles with a single-flight guard
//! - **Reports** (`report`): Terminal outcomes handed back to callers
//! - **Connection** (`connection`): Connectivity probe and failure classification

pub mod connection;
pub mod error;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod repository;
pub mod settings_sync;

pub use connection::{classify_failure, FailureKind, TestResult};
pub use error::{Result, SyncError};
pub use merge::{merge, supersedes};
pub use model::{HistoryRecord, MergeDecision, RecordSet, POSITION_UNSET};
pub use orchestrator::{
    BackendFactory, BackupProvider, ExecutionMode, OrchestratorDeps, SyncOrchestrator, SyncState,
    BACKUP_FILE, HISTORY_FILE, SETTINGS_FILE,
};
pub use report::{CycleId, SyncOperation, SyncOutcome, SyncReport, SyncStats, SyncTicket};
pub use repository::{HistoryRepository, SqliteHistoryRepository};
pub use settings_sync::{
    export_settings, is_syncable_key, parse_remote_settings, plan_settings_merge,
    SettingsMergePlan,
};
