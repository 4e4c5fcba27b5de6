//! # Core Configuration Module
//!
//! Typed configuration for the sync engine and the update fetcher.
//!
//! ## Overview
//!
//! Sync configuration lives in the host's [`SettingsStore`] under `webdav_*`
//! keys so the settings screen and the engine share one source of truth.
//! [`SyncConfig::load`] reads it at the start of every sync cycle; edits made
//! through [`SyncConfig::save`] therefore apply on the next cycle without a
//! restart.
//!
//! Exactly one backend variant is active at a time, selected by
//! [`SyncMode`]:
//!
//! - [`SyncMode::Account`] - WebDAV URL, username and password
//! - [`SyncMode::Code`] - shared sync code mapped under a public base URL,
//!   with an optional write token for uploads
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AccountConfig, SyncConfig};
//!
//! let config = SyncConfig::Account(AccountConfig {
//!     url: "https://dav.example.com/dav/".to_string(),
//!     username: "alice".to_string(),
//!     password: "secret".to_string(),
//! });
//! config.save(settings.as_ref()).await?;
//!
//! let reloaded = SyncConfig::load(settings.as_ref()).await?;
//! assert!(reloaded.is_complete());
//! ```

use crate::error::{Error, Result};
use bridge_traits::storage::SettingsStore;
use std::fmt;
use std::time::Duration;

/// Settings keys owned by the sync engine.
///
/// Every key here starts with `webdav_` so the settings sync filter can
/// exclude the whole group with a single prefix check.
pub mod keys {
    pub const SYNC_MODE: &str = "webdav_sync_mode";
    pub const URL: &str = "webdav_url";
    pub const USERNAME: &str = "webdav_username";
    pub const PASSWORD: &str = "webdav_password";
    pub const SYNC_CODE: &str = "webdav_sync_code";
    pub const PUBLIC_URL: &str = "webdav_public_url";
    pub const WRITE_TOKEN: &str = "webdav_write_token";
    pub const WRITE_ENDPOINT: &str = "webdav_write_endpoint";
    pub const SYNC_INTERVAL: &str = "webdav_sync_interval";
    pub const AUTO_SYNC: &str = "webdav_auto_sync";

    /// Prefix shared by all backend configuration keys
    pub const BACKEND_PREFIX: &str = "webdav_";

    /// Device identity keys that must never travel between devices
    pub const DEVICE_UUID: &str = "device_uuid";
    pub const DEVICE_NAME: &str = "device_name";
}

/// Which remote backend variant is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Credentialed WebDAV server
    #[default]
    Account,
    /// Public endpoint addressed by a shared sync code
    Code,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Account => "ACCOUNT",
            SyncMode::Code => "CODE",
        }
    }

    /// Parse a stored mode. Unknown values fall back to `Account`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CODE" => SyncMode::Code,
            _ => SyncMode::Account,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WebDAV account credentials
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AccountConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl AccountConfig {
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.username.trim().is_empty()
            && !self.password.is_empty()
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("url", &crate::logging::redact_url(&self.url))
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Sync-code configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CodeConfig {
    pub sync_code: String,
    pub public_base_url: String,
    /// Token for the write API. Downloads work without it.
    pub write_token: Option<String>,
    /// Gist-style write API taking `PATCH {"files": {name: {"content": ..}}}`.
    /// When unset, uploads `PUT` straight to the public file URL.
    pub write_endpoint: Option<String>,
}

impl CodeConfig {
    pub fn is_complete(&self) -> bool {
        !self.sync_code.trim().is_empty() && !self.public_base_url.trim().is_empty()
    }

    pub fn can_write(&self) -> bool {
        self.write_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

impl fmt::Debug for CodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeConfig")
            .field("sync_code", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .field("write_token", &self.write_token.as_ref().map(|_| "[REDACTED]"))
            .field("write_endpoint", &self.write_endpoint)
            .finish()
    }
}

/// Active sync configuration, exactly one variant at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncConfig {
    Account(AccountConfig),
    Code(CodeConfig),
}

impl SyncConfig {
    pub fn mode(&self) -> SyncMode {
        match self {
            SyncConfig::Account(_) => SyncMode::Account,
            SyncConfig::Code(_) => SyncMode::Code,
        }
    }

    /// Whether every required field of the active variant is non-empty
    pub fn is_complete(&self) -> bool {
        match self {
            SyncConfig::Account(account) => account.is_complete(),
            SyncConfig::Code(code) => code.is_complete(),
        }
    }

    /// Fail fast with a descriptive error when required fields are missing.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = match self {
            SyncConfig::Account(account) => [
                ("url", account.url.trim().is_empty()),
                ("username", account.username.trim().is_empty()),
                ("password", account.password.is_empty()),
            ]
            .into_iter()
            .filter_map(|(name, empty)| empty.then_some(name))
            .collect(),
            SyncConfig::Code(code) => [
                ("sync_code", code.sync_code.trim().is_empty()),
                ("public_base_url", code.public_base_url.trim().is_empty()),
            ]
            .into_iter()
            .filter_map(|(name, empty)| empty.then_some(name))
            .collect(),
        };

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "{} sync configuration is missing: {}",
                self.mode(),
                missing.join(", ")
            )))
        }
    }

    /// Read the active configuration from the settings store.
    ///
    /// Missing keys read as empty strings; use [`is_complete`](Self::is_complete)
    /// to decide whether the result is usable.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let mode = read(store, keys::SYNC_MODE)
            .await?
            .map(|value| SyncMode::parse(&value))
            .unwrap_or_default();

        let config = match mode {
            SyncMode::Account => SyncConfig::Account(AccountConfig {
                url: read(store, keys::URL).await?.unwrap_or_default(),
                username: read(store, keys::USERNAME).await?.unwrap_or_default(),
                password: read(store, keys::PASSWORD).await?.unwrap_or_default(),
            }),
            SyncMode::Code => SyncConfig::Code(CodeConfig {
                sync_code: read(store, keys::SYNC_CODE).await?.unwrap_or_default(),
                public_base_url: read(store, keys::PUBLIC_URL).await?.unwrap_or_default(),
                write_token: read(store, keys::WRITE_TOKEN)
                    .await?
                    .filter(|token| !token.is_empty()),
                write_endpoint: read(store, keys::WRITE_ENDPOINT)
                    .await?
                    .filter(|url| !url.trim().is_empty()),
            }),
        };

        Ok(config)
    }

    /// Persist this configuration and make its variant the active mode.
    ///
    /// Fields of the other variant are left untouched so switching modes back
    /// and forth does not lose them.
    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        write(store, keys::SYNC_MODE, self.mode().as_str()).await?;

        match self {
            SyncConfig::Account(account) => {
                write(store, keys::URL, account.url.trim()).await?;
                write(store, keys::USERNAME, account.username.trim()).await?;
                write(store, keys::PASSWORD, &account.password).await?;
            }
            SyncConfig::Code(code) => {
                write(store, keys::SYNC_CODE, code.sync_code.trim()).await?;
                write(store, keys::PUBLIC_URL, code.public_base_url.trim()).await?;
                write_optional(store, keys::WRITE_TOKEN, code.write_token.as_deref()).await?;
                write_optional(
                    store,
                    keys::WRITE_ENDPOINT,
                    code.write_endpoint.as_deref().map(str::trim),
                )
                .await?;
            }
        }

        Ok(())
    }
}

async fn read(store: &dyn SettingsStore, key: &str) -> Result<Option<String>> {
    store
        .get_string(key)
        .await
        .map_err(|e| Error::settings(key, e))
}

async fn write(store: &dyn SettingsStore, key: &str, value: &str) -> Result<()> {
    store
        .set_string(key, value)
        .await
        .map_err(|e| Error::settings(key, e))
}

/// Write `value`, or remove the key when there is none
async fn write_optional(store: &dyn SettingsStore, key: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(value) => write(store, key, value).await,
        None => store
            .delete(key)
            .await
            .map_err(|e| Error::settings(key, e)),
    }
}

/// User-selectable automatic sync cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncInterval {
    FifteenMinutes,
    ThirtyMinutes,
    #[default]
    OneHour,
    TwoHours,
    FourHours,
}

impl SyncInterval {
    pub const ALL: [SyncInterval; 5] = [
        SyncInterval::FifteenMinutes,
        SyncInterval::ThirtyMinutes,
        SyncInterval::OneHour,
        SyncInterval::TwoHours,
        SyncInterval::FourHours,
    ];

    pub fn minutes(&self) -> u32 {
        match self {
            SyncInterval::FifteenMinutes => 15,
            SyncInterval::ThirtyMinutes => 30,
            SyncInterval::OneHour => 60,
            SyncInterval::TwoHours => 120,
            SyncInterval::FourHours => 240,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|interval| interval.minutes() == minutes)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }

    /// Stored interval, falling back to the default for missing or unknown values
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let stored = read(store, keys::SYNC_INTERVAL).await?;
        Ok(stored
            .and_then(|value| value.trim().parse::<u32>().ok())
            .and_then(Self::from_minutes)
            .unwrap_or_default())
    }

    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store
            .put(keys::SYNC_INTERVAL, serde_json::Value::from(self.minutes()))
            .await
            .map_err(|e| Error::settings(keys::SYNC_INTERVAL, e))
    }
}

/// Whether the user enabled background auto-sync
pub async fn auto_sync_enabled(store: &dyn SettingsStore) -> Result<bool> {
    let stored = read(store, keys::AUTO_SYNC).await?;
    Ok(matches!(stored.as_deref().map(str::trim), Some("true") | Some("1")))
}

const SYNC_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const SYNC_CODE_LENGTH: usize = 8;

/// Generate a fresh 8-character sync code from OS randomness.
pub fn generate_sync_code() -> Result<String> {
    let mut code = String::with_capacity(SYNC_CODE_LENGTH);
    let mut buf = [0u8; 1];
    while code.len() < SYNC_CODE_LENGTH {
        getrandom::getrandom(&mut buf)
            .map_err(|e| Error::Internal(format!("OS randomness unavailable: {}", e)))?;
        // Rejection sampling keeps the distribution uniform over 36 symbols
        if buf[0] >= 252 {
            continue;
        }
        let index = usize::from(buf[0]) % SYNC_CODE_ALPHABET.len();
        code.push(char::from(SYNC_CODE_ALPHABET[index]));
    }
    Ok(code)
}

/// Whether a user-entered sync code has the expected shape
pub fn is_valid_sync_code(code: &str) -> bool {
    code.len() == SYNC_CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Retry and transfer tuning for the resilient fetcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Attempts per URL, including the first one
    pub max_attempts: u32,
    /// Delay after attempt `n` is `n * base_delay`
    pub base_delay: Duration,
    /// Read buffer size while streaming to disk
    pub chunk_size: usize,
    /// Upper bound for a single transfer
    pub request_timeout: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            chunk_size: 4096,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl FetchPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Fetch policy needs at least one attempt".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config(
                "Fetch chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The two equivalent read endpoints the mirror selector chooses between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub primary_base: String,
    pub alternate_base: String,
    /// Lightweight file requested from each base to measure latency
    pub probe_path: String,
    pub probe_timeout: Duration,
    /// How long a measurement stays valid
    pub validity: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            primary_base: "https://raw.githubusercontent.com/Tosencen/XMBOX-Release/main"
                .to_string(),
            alternate_base: "https://gitee.com/ochenoktochen/XMBOX-Release/raw/main".to_string(),
            probe_path: "README.md".to_string(),
            probe_timeout: Duration::from_secs(5),
            validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySettings {
        values: Mutex<HashMap<String, Value>>,
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn get_all(&self) -> BridgeResult<HashMap<String, Value>> {
            Ok(self.values.lock().unwrap().clone())
        }

        async fn get(&self, key: &str) -> BridgeResult<Option<Value>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, value: Value) -> BridgeResult<()> {
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_defaults_to_incomplete_account() {
        let store = MemorySettings::default();
        let config = SyncConfig::load(&store).await.unwrap();

        assert_eq!(config.mode(), SyncMode::Account);
        assert!(!config.is_complete());
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_account_round_trip() {
        let store = MemorySettings::default();
        let config = SyncConfig::Account(AccountConfig {
            url: " https://dav.example.com/dav ".to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
        });
        config.save(&store).await.unwrap();

        let loaded = SyncConfig::load(&store).await.unwrap();
        match loaded {
            SyncConfig::Account(account) => {
                assert_eq!(account.url, "https://dav.example.com/dav");
                assert_eq!(account.username, "alice");
                assert!(account.is_complete());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_code_mode_without_token_is_complete_but_read_only() {
        let store = MemorySettings::default();
        SyncConfig::Code(CodeConfig {
            sync_code: "AB12CD34".to_string(),
            public_base_url: "https://sync.example.com/raw".to_string(),
            write_token: None,
            write_endpoint: None,
        })
        .save(&store)
        .await
        .unwrap();

        let loaded = SyncConfig::load(&store).await.unwrap();
        assert_eq!(loaded.mode(), SyncMode::Code);
        assert!(loaded.is_complete());
        match loaded {
            SyncConfig::Code(code) => assert!(!code.can_write()),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_switching_modes_keeps_other_fields() {
        let store = MemorySettings::default();
        SyncConfig::Account(AccountConfig {
            url: "https://dav.example.com/".to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
        })
        .save(&store)
        .await
        .unwrap();
        SyncConfig::Code(CodeConfig {
            sync_code: "AB12CD34".to_string(),
            public_base_url: "https://sync.example.com".to_string(),
            write_token: Some("tok".to_string()),
            write_endpoint: Some(" https://api.example.com/gists/abc ".to_string()),
        })
        .save(&store)
        .await
        .unwrap();

        assert_eq!(
            store.get_string(keys::USERNAME).await.unwrap(),
            Some("alice".to_string())
        );

        match SyncConfig::load(&store).await.unwrap() {
            SyncConfig::Code(code) => assert_eq!(
                code.write_endpoint.as_deref(),
                Some("https://api.example.com/gists/abc")
            ),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_debug_output_hides_credentials() {
        let account = AccountConfig {
            url: "https://bob:pw@dav.example.com/".to_string(),
            username: "bob".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", account);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("bob:pw"));
    }

    #[test]
    fn test_sync_mode_parse() {
        assert_eq!(SyncMode::parse("CODE"), SyncMode::Code);
        assert_eq!(SyncMode::parse("code"), SyncMode::Code);
        assert_eq!(SyncMode::parse("ACCOUNT"), SyncMode::Account);
        assert_eq!(SyncMode::parse("garbage"), SyncMode::Account);
    }

    #[tokio::test]
    async fn test_sync_interval_load() {
        let store = MemorySettings::default();
        assert_eq!(SyncInterval::load(&store).await.unwrap(), SyncInterval::OneHour);

        SyncInterval::TwoHours.save(&store).await.unwrap();
        assert_eq!(SyncInterval::load(&store).await.unwrap(), SyncInterval::TwoHours);

        store.set_string(keys::SYNC_INTERVAL, "45").await.unwrap();
        assert_eq!(SyncInterval::load(&store).await.unwrap(), SyncInterval::OneHour);
    }

    #[test]
    fn test_sync_interval_values() {
        let minutes: Vec<u32> = SyncInterval::ALL.iter().map(|i| i.minutes()).collect();
        assert_eq!(minutes, vec![15, 30, 60, 120, 240]);
        assert_eq!(SyncInterval::FifteenMinutes.as_duration(), Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_auto_sync_flag() {
        let store = MemorySettings::default();
        assert!(!auto_sync_enabled(&store).await.unwrap());

        store.put(keys::AUTO_SYNC, Value::Bool(true)).await.unwrap();
        assert!(auto_sync_enabled(&store).await.unwrap());
    }

    #[test]
    fn test_generate_sync_code() {
        let code = generate_sync_code().unwrap();
        assert!(is_valid_sync_code(&code), "bad code: {}", code);

        let other = generate_sync_code().unwrap();
        // 36^8 possibilities; a collision here means the generator is broken
        assert_ne!(code, other);
    }

    #[test]
    fn test_is_valid_sync_code() {
        assert!(is_valid_sync_code("AB12CD34"));
        assert!(!is_valid_sync_code("ab12cd34"));
        assert!(!is_valid_sync_code("AB12"));
    }

    #[test]
    fn test_fetch_policy_defaults() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.chunk_size, 4096);
        assert!(policy.validate().is_ok());

        let invalid = FetchPolicy {
            max_attempts: 0,
            ..FetchPolicy::default()
        };
        assert!(invalid.validate().is_err());
    }
}
