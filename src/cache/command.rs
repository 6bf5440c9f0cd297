//! Analysis cache reached through an external helper process.
//!
//! The helper speaks two verbs:
//!
//! ```text
//! <helper> status --db DB --book-id N --format F   -> {"status": <record|null>, ...}
//! <helper> upsert --db DB                          <- record JSON on stdin
//! ```
//!
//! `calibre-lens cache` implements the same protocol, so this store can
//! also point at another calibre-lens installation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::AnalysisStore;
use crate::adapters::ToolCommand;
use crate::domain::{CacheRecord, Lang, RecordKey};

/// Helper-process backed analysis cache
pub struct CommandStore {
    helper: Vec<String>,
    db: PathBuf,
    timeout: Option<Duration>,
}

/// Reply of the `status` verb; `status` is decoded separately so that a
/// helper storing records in another shape still yields its digest
#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: Option<serde_json::Value>,
}

impl CommandStore {
    pub fn new(helper: Vec<String>, db: impl Into<PathBuf>) -> Self {
        Self {
            helper,
            db: db.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn status_command(&self, key: &RecordKey) -> ToolCommand {
        ToolCommand::new("cache-helper", &self.helper)
            .args(["status", "--db"])
            .arg(self.db.to_string_lossy().to_string())
            .arg("--book-id")
            .arg(key.book_id.to_string())
            .arg("--format")
            .arg(key.format.as_str())
            .timeout(self.timeout)
    }

    pub fn upsert_command(&self, record: &CacheRecord) -> Result<ToolCommand> {
        let payload = serde_json::to_string(record).context("Failed to serialize cache record")?;
        Ok(ToolCommand::new("cache-helper", &self.helper)
            .args(["upsert", "--db"])
            .arg(self.db.to_string_lossy().to_string())
            .stdin(payload)
            .timeout(self.timeout))
    }
}

/// Decode a `status` reply; a null or absent `status` means no record.
///
/// Only `file_hash` matters to the gate. A record that doesn't match our
/// schema is reduced to the requested key plus whatever string digest it
/// carries, so the worst outcome is a recompute.
pub fn parse_status_reply(stdout: &str, key: &RecordKey) -> Result<Option<CacheRecord>> {
    let reply: StatusReply =
        serde_json::from_str(stdout).context("Failed to parse cache helper status reply")?;

    let value = match reply.status {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    match serde_json::from_value::<CacheRecord>(value.clone()) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(%key, error = %e, "Cache helper returned a foreign record, keeping only its digest");
            Ok(Some(digest_only(key, &value)))
        }
    }
}

fn digest_only(key: &RecordKey, value: &Value) -> CacheRecord {
    CacheRecord {
        book_id: key.book_id,
        library_id: String::new(),
        title: String::new(),
        format: key.format.clone(),
        file_hash: value
            .get("file_hash")
            .and_then(Value::as_str)
            .map(str::to_string),
        lang: Lang::default(),
        summary: String::new(),
        highlights: Vec::new(),
        reread: Vec::new(),
        tags: Vec::new(),
        updated_at: None,
    }
}

#[async_trait]
impl AnalysisStore for CommandStore {
    fn name(&self) -> &str {
        "command"
    }

    async fn status(&self, key: &RecordKey) -> Result<Option<CacheRecord>> {
        let stdout = self.status_command(key).run().await?;
        parse_status_reply(&stdout, key)
    }

    async fn upsert(&self, record: &CacheRecord) -> Result<()> {
        self.upsert_command(record)?.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BookFormat;

    #[test]
    fn test_status_command_shape() {
        let store = CommandStore::new(
            vec!["calibre-lens".to_string(), "cache".to_string()],
            "/data/cache.sqlite",
        );
        let cmd = store.status_command(&RecordKey::new(3, BookFormat::default()));
        assert_eq!(
            cmd.argv(),
            [
                "calibre-lens",
                "cache",
                "status",
                "--db",
                "/data/cache.sqlite",
                "--book-id",
                "3",
                "--format",
                "EPUB",
            ]
        );
    }

    #[test]
    fn test_parse_status_reply() {
        let key = RecordKey::new(3, BookFormat::default());
        assert!(parse_status_reply(r#"{"ok": true, "status": null}"#, &key)
            .unwrap()
            .is_none());
        assert!(parse_status_reply(r#"{"ok": true}"#, &key).unwrap().is_none());

        let record = parse_status_reply(
            r#"{"ok": true, "status": {"book_id": 3, "format": "EPUB", "file_hash": "sha256:ab"}}"#,
            &key,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.book_id, 3);
        assert_eq!(record.file_hash.as_deref(), Some("sha256:ab"));

        assert!(parse_status_reply("oops", &key).is_err());
    }

    #[test]
    fn test_foreign_shaped_record_keeps_digest() {
        let key = RecordKey::new(3, BookFormat::default());
        let digest = format!("sha256:{}", "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
        let reply = serde_json::json!({
            "status": {
                "book_id": 3,
                "format": "EPUB",
                "file_hash": digest,
                "highlights": "[\"a\"]",
                "lang": "fr",
            }
        });

        let record = parse_status_reply(&reply.to_string(), &key)
            .unwrap()
            .unwrap();
        assert_eq!(record.key(), key);
        assert_eq!(record.file_hash.as_deref(), Some(digest.as_str()));
        assert!(record.highlights.is_empty());
    }

    #[test]
    fn test_non_object_status_has_no_digest() {
        let key = RecordKey::new(3, BookFormat::default());
        let record = parse_status_reply(r#"{"status": "cached"}"#, &key)
            .unwrap()
            .unwrap();
        assert!(record.file_hash.is_none());
    }
}
