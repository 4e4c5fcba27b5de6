//! Remote Storage and Settings Abstractions
//!
//! Provides the contract every remote backend variant fulfils, plus the
//! key-value settings store owned by the host application.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// Entry returned when listing a remote container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full URL or path of the entry
    pub href: String,
    pub is_container: bool,
    pub size: Option<u64>,
}

/// Remote file store used as the only coordination medium between devices.
///
/// The store has no server-side logic: it can only report existence, hand
/// bytes back, and accept overwrites. Implementations map transport failures
/// to `BridgeError::Transport`, explicit "missing" answers to `Ok(false)` /
/// `BridgeError::NotFound`, and missing write credentials to
/// `BridgeError::NotAuthorized`.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::RemoteBackend;
///
/// async fn push(backend: &dyn RemoteBackend, json: Vec<u8>) -> Result<()> {
///     let path = backend.file_path("xmbox_history.json");
///     backend.put(&path, json.into()).await
/// }
/// ```
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short human-readable backend name for logs
    fn name(&self) -> &'static str;

    /// Container (directory) all sync files live in, always slash-terminated
    fn container_path(&self) -> String;

    /// Full path of a sync file inside the container
    fn file_path(&self, file_name: &str) -> String {
        join_path(&self.container_path(), file_name)
    }

    /// Check whether a file exists.
    ///
    /// Returns `Ok(false)` only when the remote explicitly answers "not found".
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Download a file's bytes
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Upload (overwrite) a file
    async fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// List the entries of a container
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Create the container if it does not exist.
    ///
    /// Best-effort: callers log and ignore failures because some servers
    /// create containers implicitly on `put`.
    async fn ensure_container(&self, path: &str) -> Result<()>;
}

/// Ensure a base URL ends with exactly one trailing slash
pub fn normalize_base(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Append a segment to a base URL, tolerating a base with or without a
/// trailing slash and a segment with or without a leading one.
pub fn join_path(base: &str, segment: &str) -> String {
    format!("{}{}", normalize_base(base), segment.trim_start_matches('/'))
}

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences/settings storage:
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed key-value table
///
/// Values are arbitrary JSON so the whole map can be shipped as the remote
/// settings file without lossy conversion.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_preference(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("webdav_url", "https://dav.example.com/dav/").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Snapshot of every stored setting
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    /// Retrieve a single value
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store (insert or overwrite) a value
    async fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Retrieve a value as a string.
    ///
    /// Non-string scalars are rendered with their JSON text so that numeric
    /// settings written by other devices still read back.
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).await?.and_then(|value| match value {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }))
    }

    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, Value::String(value.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("https://dav.example.com/dav"), "https://dav.example.com/dav/");
        assert_eq!(normalize_base("https://dav.example.com/dav/"), "https://dav.example.com/dav/");
    }

    #[test]
    fn test_join_path_tolerates_slashes() {
        let expected = "https://dav.example.com/dav/xmbox_history.json";
        assert_eq!(join_path("https://dav.example.com/dav", "xmbox_history.json"), expected);
        assert_eq!(join_path("https://dav.example.com/dav/", "xmbox_history.json"), expected);
        assert_eq!(join_path("https://dav.example.com/dav/", "/xmbox_history.json"), expected);
    }
}
