//! Domain types for calibre-lens.
//!
//! This module contains the core data structures:
//! - Catalog: rows read from calibre, library locator, credentials
//! - Hash: algorithm-tagged content digests
//! - Record: cached analyses and the metadata payload

pub mod catalog;
pub mod hash;
pub mod record;

// Re-export commonly used types
pub use catalog::{
    CatalogItem, Credentials, LibraryLocator, DEFAULT_FIELDS, DEFAULT_ID_FIELDS, DEFAULT_PASSWORD_ENV,
};
pub use hash::{ContentHash, HashError, StoredDigest};
pub use record::{
    AnalysisCore, AnalysisPayload, BookFormat, CacheRecord, Lang, MetadataPayload, RecordKey,
    RereadAnchor, ANALYSIS_TAGS,
};
