//! Cache CLI subcommands.
//!
//! Exposes the SQLite analysis cache through the same `status` / `upsert`
//! protocol that [`crate::cache::CommandStore`] speaks, so one calibre-lens
//! installation can act as the cache helper of another.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use tokio::io::AsyncReadExt;

use super::output::{CacheStatusReport, CacheUpsertReport, Report};
use crate::cache::{AnalysisStore, SqliteStore};
use crate::domain::{BookFormat, CacheRecord, RecordKey};

/// Cache-related subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Print the stored record for a book, or null
    Status {
        /// Cache database (defaults to the configured one)
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long)]
        book_id: u64,

        #[arg(long, default_value = "EPUB")]
        format: String,
    },

    /// Replace a record with the JSON read from stdin
    Upsert {
        /// Cache database (defaults to the configured one)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn resolve_db(db: Option<PathBuf>) -> Result<PathBuf> {
    match db {
        Some(db) => Ok(db),
        None => Ok(crate::config::config()?.db.clone()),
    }
}

/// Execute cache subcommands
pub async fn execute(command: CacheCommands) -> Result<Report> {
    match command {
        CacheCommands::Status {
            db,
            book_id,
            format,
        } => {
            let store = SqliteStore::new(resolve_db(db)?);
            status(&store, RecordKey::new(book_id, BookFormat::new(format))).await
        }
        CacheCommands::Upsert { db } => {
            let store = SqliteStore::new(resolve_db(db)?);

            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read record from stdin")?;

            upsert(&store, &input).await
        }
    }
}

async fn status(store: &dyn AnalysisStore, key: RecordKey) -> Result<Report> {
    let record = store.status(&key).await?;
    Report::compact(CacheStatusReport {
        ok: true,
        book_id: key.book_id,
        format: key.format.to_string(),
        status: record,
    })
}

async fn upsert(store: &dyn AnalysisStore, input: &str) -> Result<Report> {
    let record: CacheRecord =
        serde_json::from_str(input.trim()).context("Invalid cache record JSON on stdin")?;
    store.upsert(&record).await?;

    Report::compact(CacheUpsertReport {
        ok: true,
        book_id: record.book_id,
        format: record.format.to_string(),
        upserted: true,
    })
}
