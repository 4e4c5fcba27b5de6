//! Integrity checks for a finished download.
//!
//! Size and header checks only run when the expected length is known. The
//! digest check runs whenever a digest was supplied.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use crate::error::{FetchError, Result};

/// Local file header of a ZIP archive (`PK\x03\x04`), which every Android
/// package starts with
pub const PACKAGE_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// What the downloaded bytes are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadKind {
    /// Installable package; must carry the ZIP header
    Package,
    /// Anything else (manifests, JSON)
    #[default]
    Data,
}

/// Verification inputs for one download
#[derive(Debug, Clone, Default)]
pub struct Expectations<'a> {
    pub length: Option<u64>,
    pub kind: PayloadKind,
    /// Lowercase or uppercase hex SHA-256
    pub sha256: Option<&'a str>,
}

/// Check a finished download against what was expected of it
pub async fn verify_download(path: &Path, expected: &Expectations<'_>) -> Result<()> {
    if let Some(length) = expected.length {
        verify_size_and_header(path, length, expected.kind).await?;
    }

    if let Some(digest) = expected.sha256 {
        let actual = sha256_hex(path).await?;
        if !actual.eq_ignore_ascii_case(digest.trim()) {
            error!(expected = digest, actual = %actual, "SHA-256 mismatch");
            return Err(FetchError::Integrity(format!(
                "SHA-256 mismatch: expected {}, got {}",
                digest, actual
            )));
        }
    }

    debug!(path = %path.display(), "Download verified");
    Ok(())
}

async fn verify_size_and_header(path: &Path, expected: u64, kind: PayloadKind) -> Result<()> {
    let actual = tokio::fs::metadata(path).await?.len();
    if actual == 0 {
        return Err(FetchError::Integrity("file is empty".to_string()));
    }
    if actual != expected {
        error!(expected, actual, "File size mismatch");
        return Err(FetchError::Integrity(format!(
            "size mismatch: expected {} bytes, got {}",
            expected, actual
        )));
    }

    if kind == PayloadKind::Package {
        let mut header = [0u8; 4];
        let mut file = File::open(path).await?;
        if actual < header.len() as u64 {
            return Err(FetchError::Integrity(format!("file too small: {} bytes", actual)));
        }
        file.read_exact(&mut header).await?;
        if header != PACKAGE_MAGIC {
            return Err(FetchError::Integrity(format!(
                "invalid package header: {:02X} {:02X} {:02X} {:02X}",
                header[0], header[1], header[2], header[3]
            )));
        }
    }

    Ok(())
}

/// Hex-encoded SHA-256 of a file
pub async fn sha256_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect())
}
