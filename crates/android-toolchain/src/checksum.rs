//! Checksum computation for downloaded archives.
//!
//! The repository publishes SHA-1 digests for older packages and SHA-256 for
//! newer ones.

use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ChecksumKind {
    Sha1,
    Sha256,
}

impl ChecksumKind {
    /// Parse the repository `type` attribute (`sha1`, `sha-256`, ...)
    pub fn from_attribute(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Some(ChecksumKind::Sha1),
            "sha256" => Some(ChecksumKind::Sha256),
            _ => None,
        }
    }

    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            40 => Some(ChecksumKind::Sha1),
            64 => Some(ChecksumKind::Sha256),
            _ => None,
        }
    }
}

/// Expected digest of an archive
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Checksum {
    pub kind: ChecksumKind,
    /// Lowercase hex
    pub value: String,
}

impl Checksum {
    pub fn new(kind: ChecksumKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into().trim().to_ascii_lowercase(),
        }
    }

    pub fn matches(&self, actual: &str) -> bool {
        self.value.eq_ignore_ascii_case(actual)
    }
}

/// Hex digest of a file, read in chunks
pub async fn compute(path: &Path, kind: ChecksumKind) -> std::io::Result<String> {
    match kind {
        ChecksumKind::Sha1 => digest_file::<Sha1>(path).await,
        ChecksumKind::Sha256 => digest_file::<Sha256>(path).await,
    }
}

/// Check a file against an expected checksum
pub async fn verify(path: &Path, expected: &Checksum) -> std::io::Result<bool> {
    debug!("Verifying checksum for {:?}", path);

    let actual = compute(path, expected.kind).await?;
    if expected.matches(&actual) {
        debug!("Checksum verified");
        Ok(true)
    } else {
        warn!("Checksum mismatch: expected {}, got {}", expected.value, actual);
        Ok(false)
    }
}

async fn digest_file<D: Digest>(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
