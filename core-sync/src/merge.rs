//! # Merge Engine
//!
//! Pure reconciliation of a local record set against a remote snapshot.
//!
//! The merge is insert/update only. Records that exist only locally are never
//! touched, so a deletion on one device is undone by the next sync from any
//! device that still holds the record.
//!
//! Freshness is decided by `create_time` ("last touched"). On a tie, a known
//! playback position beats an unknown one, and a further position beats an
//! earlier one.

use crate::model::{HistoryRecord, MergeDecision, RecordSet};

/// Whether `remote` should replace `local` for the same key
pub fn supersedes(remote: &HistoryRecord, local: &HistoryRecord) -> bool {
    if remote.create_time != local.create_time {
        return remote.create_time > local.create_time;
    }

    match (remote.has_position(), local.has_position()) {
        (true, true) => remote.position > local.position,
        (true, false) => true,
        _ => false,
    }
}

/// Reconcile `remote` into `local`.
///
/// Total and deterministic: output lists follow key order, and applying the
/// decision then merging the same remote set again yields an empty decision.
pub fn merge(local: &RecordSet, remote: &RecordSet) -> MergeDecision {
    let mut decision = MergeDecision::default();

    for record in remote.iter() {
        match local.get(&record.key) {
            None => decision.to_insert.push(record.clone()),
            Some(existing) if supersedes(record, existing) => {
                decision.to_update.push(record.clone())
            }
            Some(_) => {}
        }
    }

    decision
}
