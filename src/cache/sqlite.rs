//! SQLite-backed analysis cache.
//!
//! One row per `(book_id, format)`. List-valued fields are stored as JSON
//! text. Every operation opens its own connection on a blocking thread;
//! upserts run inside a transaction so a record is replaced whole or not
//! at all.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::AnalysisStore;
use crate::domain::{BookFormat, CacheRecord, Lang, RecordKey};

/// Current schema version (`PRAGMA user_version`)
const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analysis_cache (
    book_id     INTEGER NOT NULL,
    format      TEXT    NOT NULL,
    library_id  TEXT    NOT NULL DEFAULT '',
    title       TEXT    NOT NULL DEFAULT '',
    file_hash   TEXT,
    lang        TEXT    NOT NULL DEFAULT 'ja',
    summary     TEXT    NOT NULL DEFAULT '',
    highlights  TEXT    NOT NULL DEFAULT '[]',
    reread      TEXT    NOT NULL DEFAULT '[]',
    tags        TEXT    NOT NULL DEFAULT '[]',
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (book_id, format)
);
";

/// File-backed SQLite analysis cache
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection, creating the file and schema on first use
    fn connect(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open analysis cache: {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            anyhow::bail!(
                "Analysis cache {} has schema version {}, newer than supported {}",
                path.display(),
                version,
                SCHEMA_VERSION
            );
        }
        if version < SCHEMA_VERSION {
            conn.execute_batch(SCHEMA)
                .context("Failed to create analysis cache schema")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(conn)
    }

    fn status_blocking(path: &Path, key: &RecordKey) -> Result<Option<CacheRecord>> {
        let book_id = sql_book_id(key.book_id)?;
        let conn = Self::connect(path)?;

        let row = conn
            .query_row(
                "SELECT book_id, format, library_id, title, file_hash, lang, summary,
                        highlights, reread, tags, updated_at
                 FROM analysis_cache WHERE book_id = ?1 AND format = ?2",
                params![book_id, key.format.as_str()],
                |row| {
                    Ok(RawRow {
                        book_id: row.get(0)?,
                        format: row.get(1)?,
                        library_id: row.get(2)?,
                        title: row.get(3)?,
                        file_hash: row.get(4)?,
                        lang: row.get(5)?,
                        summary: row.get(6)?,
                        highlights: row.get(7)?,
                        reread: row.get(8)?,
                        tags: row.get(9)?,
                        updated_at: row.get(10)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to read cache record {}", key))?;

        row.map(RawRow::into_record).transpose()
    }

    fn upsert_blocking(path: &Path, record: &CacheRecord) -> Result<DateTime<Utc>> {
        let book_id = sql_book_id(record.book_id)?;
        let mut conn = Self::connect(path)?;
        let now = Utc::now();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO analysis_cache
                 (book_id, format, library_id, title, file_hash, lang, summary,
                  highlights, reread, tags, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (book_id, format) DO UPDATE SET
                 library_id = excluded.library_id,
                 title      = excluded.title,
                 file_hash  = excluded.file_hash,
                 lang       = excluded.lang,
                 summary    = excluded.summary,
                 highlights = excluded.highlights,
                 reread     = excluded.reread,
                 tags       = excluded.tags,
                 updated_at = excluded.updated_at",
            params![
                book_id,
                record.format.as_str(),
                record.library_id,
                record.title,
                record.file_hash,
                record.lang.to_string(),
                record.summary,
                serde_json::to_string(&record.highlights)?,
                serde_json::to_string(&record.reread)?,
                serde_json::to_string(&record.tags)?,
                now.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to write cache record {}", record.key()))?;
        tx.commit().context("Failed to commit cache record")?;

        Ok(now)
    }
}

/// SQLite integers are signed; ids past `i64::MAX` can't be keyed
fn sql_book_id(book_id: u64) -> Result<i64> {
    i64::try_from(book_id)
        .with_context(|| format!("Book id {} is too large for the analysis cache", book_id))
}

/// Row as stored, before JSON columns are decoded
struct RawRow {
    book_id: i64,
    format: String,
    library_id: String,
    title: String,
    file_hash: Option<String>,
    lang: String,
    summary: String,
    highlights: String,
    reread: String,
    tags: String,
    updated_at: String,
}

impl RawRow {
    fn into_record(self) -> Result<CacheRecord> {
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|t| t.with_timezone(&Utc))
            .ok();

        Ok(CacheRecord {
            book_id: u64::try_from(self.book_id).context("Negative book id in cache")?,
            format: BookFormat::new(self.format),
            library_id: self.library_id,
            title: self.title,
            file_hash: self.file_hash,
            lang: self.lang.parse::<Lang>().unwrap_or_default(),
            summary: self.summary,
            highlights: serde_json::from_str(&self.highlights)
                .context("Corrupt highlights column")?,
            reread: serde_json::from_str(&self.reread).context("Corrupt reread column")?,
            tags: serde_json::from_str(&self.tags).context("Corrupt tags column")?,
            updated_at,
        })
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn status(&self, key: &RecordKey) -> Result<Option<CacheRecord>> {
        let path = self.path.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || Self::status_blocking(&path, &key))
            .await
            .context("Cache read task panicked")?
    }

    async fn upsert(&self, record: &CacheRecord) -> Result<()> {
        let path = self.path.clone();
        let record = record.clone();
        let written_at =
            tokio::task::spawn_blocking(move || Self::upsert_blocking(&path, &record))
                .await
                .context("Cache write task panicked")??;
        debug!(db = %self.path.display(), %written_at, "Cache record upserted");
        Ok(())
    }
}
