//! Algorithm-tagged content digests.
//!
//! Digests are rendered as `<algorithm>:<lower-case hex>`, e.g.
//! `sha256:2cf24dba...`. Stored digests that carry another tag, or that
//! don't parse, are reported as foreign rather than as errors.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;

/// Tag written in front of SHA-256 digests
pub const SHA256_TAG: &str = "sha256";

/// Hex length of a SHA-256 digest
const SHA256_HEX_LEN: usize = 64;

/// Errors raised while hashing a source file
#[derive(Debug, Error)]
pub enum HashError {
    #[error("Exported file is missing: {0}")]
    Missing(String),

    #[error("Exported file is empty: {0}")]
    Empty(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A SHA-256 digest of a file's full byte content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash {
    hex: String,
}

impl ContentHash {
    /// Hash a byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            hex: hex::encode(hasher.finalize()),
        }
    }

    /// Hash a file on disk.
    ///
    /// A missing or zero-length file is a hard failure: an empty export
    /// means the catalog handed us nothing worth analysing.
    pub async fn of_file(path: &Path) -> Result<Self, HashError> {
        let display = path.display().to_string();

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HashError::Missing(display));
            }
            Err(source) => {
                return Err(HashError::Io {
                    path: display,
                    source,
                })
            }
        };

        if bytes.is_empty() {
            return Err(HashError::Empty(display));
        }

        Ok(Self::of_bytes(&bytes))
    }

    /// Hex digest without the algorithm tag
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Classify a digest string read back from the cache store
    pub fn parse_stored(stored: Option<&str>) -> StoredDigest {
        let Some(raw) = stored.map(str::trim).filter(|s| !s.is_empty()) else {
            return StoredDigest::Missing;
        };

        match raw.split_once(':') {
            Some((tag, hex))
                if tag.eq_ignore_ascii_case(SHA256_TAG)
                    && hex.len() == SHA256_HEX_LEN
                    && hex.chars().all(|c| c.is_ascii_hexdigit()) =>
            {
                StoredDigest::Sha256(Self {
                    hex: hex.to_ascii_lowercase(),
                })
            }
            _ => StoredDigest::Foreign(raw.to_string()),
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", SHA256_TAG, self.hex)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match Self::parse_stored(Some(&value)) {
            StoredDigest::Sha256(hash) => Ok(hash),
            _ => Err(format!("not a sha256 digest: {}", value)),
        }
    }
}

/// What a stored digest field turned out to contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredDigest {
    /// Field absent or blank
    Missing,

    /// Another algorithm tag, or not a well-formed digest
    Foreign(String),

    /// A usable SHA-256 digest
    Sha256(ContentHash),
}
