//! Analysis cache storage.
//!
//! Records are keyed by `(book_id, format)` and carry the content hash of
//! the file they were computed from. The pipeline reads a record once per
//! run and, only when the hash no longer matches, replaces it.
//!
//! * [`sqlite`]: in-process SQLite store (default)
//! * [`command`]: the same two operations delegated to a helper process

pub mod command;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{CacheRecord, RecordKey};

pub use command::CommandStore;
pub use sqlite::SqliteStore;

/// Read-then-replace access to cached analyses
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    fn name(&self) -> &str;

    /// Stored record for a key, if any
    async fn status(&self, key: &RecordKey) -> Result<Option<CacheRecord>>;

    /// Atomically replace the record for `record.key()`
    async fn upsert(&self, record: &CacheRecord) -> Result<()>;
}
