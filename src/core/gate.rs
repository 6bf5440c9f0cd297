//! Content-hash cache gate.
//!
//! Decides whether a freshly exported file needs analysing again. The only
//! thing that can make a stored analysis reusable is a stored SHA-256
//! digest equal to the digest of the current bytes; anything else
//! (no record, no digest, another algorithm, a changed file) recomputes.

use serde::Serialize;

use crate::domain::{CacheRecord, ContentHash, StoredDigest};

/// Outcome of the gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Stored analysis is current
    Skip,

    /// Analysis must be recomputed
    Recompute(RecomputeReason),
}

/// Why the gate sent a book to recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeReason {
    /// Nothing stored for this book and format
    NoRecord,

    /// A record exists but carries no digest
    MissingDigest,

    /// Stored digest uses another algorithm or is malformed
    ForeignDigest,

    /// Stored digest differs from the current file
    DigestChanged,
}

impl RecomputeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecomputeReason::NoRecord => "no_record",
            RecomputeReason::MissingDigest => "missing_digest",
            RecomputeReason::ForeignDigest => "foreign_digest",
            RecomputeReason::DigestChanged => "digest_changed",
        }
    }
}

impl std::fmt::Display for RecomputeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compare the current digest with whatever the store returned
pub fn check(current: &ContentHash, stored: Option<&CacheRecord>) -> GateDecision {
    let Some(record) = stored else {
        return GateDecision::Recompute(RecomputeReason::NoRecord);
    };

    match ContentHash::parse_stored(record.file_hash.as_deref()) {
        StoredDigest::Missing => GateDecision::Recompute(RecomputeReason::MissingDigest),
        StoredDigest::Foreign(_) => GateDecision::Recompute(RecomputeReason::ForeignDigest),
        StoredDigest::Sha256(previous) if &previous == current => GateDecision::Skip,
        StoredDigest::Sha256(_) => GateDecision::Recompute(RecomputeReason::DigestChanged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_hash(file_hash: Option<&str>) -> CacheRecord {
        let mut record: CacheRecord =
            serde_json::from_value(serde_json::json!({"book_id": 1, "format": "EPUB"})).unwrap();
        record.file_hash = file_hash.map(str::to_string);
        record
    }

    #[test]
    fn test_no_record_recomputes() {
        let current = ContentHash::of_bytes(b"hello");
        assert_eq!(
            check(&current, None),
            GateDecision::Recompute(RecomputeReason::NoRecord)
        );
    }

    #[test]
    fn test_same_digest_skips() {
        let current = ContentHash::of_bytes(b"hello");
        let stored = record_with_hash(Some(&current.to_string()));
        assert_eq!(check(&current, Some(&stored)), GateDecision::Skip);
    }

    #[test]
    fn test_changed_digest_recomputes() {
        let current = ContentHash::of_bytes(b"hello!");
        let stored = record_with_hash(Some(&ContentHash::of_bytes(b"hello").to_string()));
        assert_eq!(
            check(&current, Some(&stored)),
            GateDecision::Recompute(RecomputeReason::DigestChanged)
        );
    }

    #[test]
    fn test_missing_or_foreign_digest_is_not_an_error() {
        let current = ContentHash::of_bytes(b"hello");

        assert_eq!(
            check(&current, Some(&record_with_hash(None))),
            GateDecision::Recompute(RecomputeReason::MissingDigest)
        );

        // Same bytes, other algorithm: still no match
        let md5 = record_with_hash(Some("md5:5d41402abc4b2a76b9719d911017c592"));
        assert_eq!(
            check(&current, Some(&md5)),
            GateDecision::Recompute(RecomputeReason::ForeignDigest)
        );

        // Untagged hex of the same content is not trusted either
        let bare = record_with_hash(Some(current.hex()));
        assert_eq!(
            check(&current, Some(&bare)),
            GateDecision::Recompute(RecomputeReason::ForeignDigest)
        );
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(RecomputeReason::NoRecord.to_string(), "no_record");
        assert_eq!(
            serde_json::to_value(RecomputeReason::DigestChanged).unwrap(),
            "digest_changed"
        );
    }
}
