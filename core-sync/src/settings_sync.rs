//! Settings sync: filter and union-merge over the flat preferences map.
//!
//! Unlike history there is no freshness comparison. A remote value always
//! overwrites the local one, except for keys that describe the sync backend
//! itself or identify the device; syncing those would point every device at
//! whichever configuration was uploaded last.

use core_runtime::config::keys;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{Result, SyncError};

/// Whether a settings key may travel between devices
pub fn is_syncable_key(key: &str) -> bool {
    !key.starts_with(keys::BACKEND_PREFIX) && key != keys::DEVICE_UUID && key != keys::DEVICE_NAME
}

/// Build the remote settings object from a local snapshot
pub fn export_settings(local: &HashMap<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = local
        .iter()
        .filter(|(key, _)| is_syncable_key(key))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    entries
        .into_iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Decode the remote settings file.
///
/// An empty body is an empty map. Anything other than a JSON object is malformed.
pub fn parse_remote_settings(bytes: &[u8]) -> Result<Map<String, Value>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SyncError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(SyncError::MalformedPayload(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Which remote entries to write locally
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsMergePlan {
    pub to_apply: Vec<(String, Value)>,
    /// Excluded keys present in the remote file
    pub skipped: usize,
}

/// Union-merge: every syncable remote key is applied, excluded keys are skipped.
pub fn plan_settings_merge(remote: Map<String, Value>) -> SettingsMergePlan {
    let mut plan = SettingsMergePlan::default();

    for (key, value) in remote {
        if is_syncable_key(&key) {
            plan.to_apply.push((key, value));
        } else {
            plan.skipped += 1;
        }
    }

    plan.to_apply.sort_by(|a, b| a.0.cmp(&b.0));
    plan
}
