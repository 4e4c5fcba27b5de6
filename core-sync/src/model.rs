//! # Record Model
//!
//! Watch-history entries as they travel between devices.
//!
//! The remote history file is a JSON array of objects carrying at least
//! `key`, `createTime` and `position`. Any other fields a device writes
//! (titles, artwork URLs, ...) are kept verbatim so a record survives a round
//! trip through a device that does not understand them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Sentinel for an unknown playback position
pub const POSITION_UNSET: i64 = -1;

/// One watch-history entry.
///
/// `create_time` is the "last touched" time in epoch millis, refreshed on
/// every playback event, not only at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub key: String,
    pub create_time: i64,
    #[serde(default = "unset_position")]
    pub position: i64,
    /// Fields this engine does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unset_position() -> i64 {
    POSITION_UNSET
}

impl HistoryRecord {
    pub fn new(key: impl Into<String>, create_time: i64, position: i64) -> Self {
        Self {
            key: key.into(),
            create_time,
            position,
            extra: Map::new(),
        }
    }

    /// Whether the playback position is known
    pub fn has_position(&self) -> bool {
        self.position >= 0
    }
}

/// Records keyed by `key`. Iteration order is the key order, which keeps
/// merge output deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: BTreeMap<String, HistoryRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, enforcing key uniqueness.
    ///
    /// Records with an empty key are dropped. When a key repeats, the record
    /// that would win a merge against the other is kept.
    pub fn from_records(records: impl IntoIterator<Item = HistoryRecord>) -> Self {
        let mut set = Self::new();
        let mut skipped = 0usize;

        for record in records {
            if record.key.trim().is_empty() {
                skipped += 1;
                continue;
            }
            match set.records.get(&record.key) {
                Some(existing) if !crate::merge::supersedes(&record, existing) => {}
                _ => {
                    set.records.insert(record.key.clone(), record);
                }
            }
        }

        if skipped > 0 {
            warn!(skipped, "Dropped history records with an empty key");
        }

        set
    }

    /// Decode the remote history file.
    ///
    /// An empty or whitespace-only body is an empty set, not an error.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }

        let records: Vec<HistoryRecord> = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::MalformedPayload(e.to_string()))?;
        Ok(Self::from_records(records))
    }

    /// Encode as the remote history file
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let records: Vec<&HistoryRecord> = self.records.values().collect();
        serde_json::to_vec(&records).map_err(|e| SyncError::MalformedPayload(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&HistoryRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.values()
    }

    /// Overwrite whole records the way local storage would after a merge
    pub fn apply(&mut self, decision: &MergeDecision) {
        for record in decision.to_insert.iter().chain(decision.to_update.iter()) {
            self.records.insert(record.key.clone(), record.clone());
        }
    }
}

impl FromIterator<HistoryRecord> for RecordSet {
    fn from_iter<T: IntoIterator<Item = HistoryRecord>>(iter: T) -> Self {
        Self::from_records(iter)
    }
}

/// Output of one merge: disjoint insert and update lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeDecision {
    /// Remote records with no local counterpart
    pub to_insert: Vec<HistoryRecord>,
    /// Remote records that supersede their local counterpart
    pub to_update: Vec<HistoryRecord>,
}

impl MergeDecision {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_insert.len() + self.to_update.len()
    }
}
