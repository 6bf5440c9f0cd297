//! Metadata-apply helper adapter.
//!
//! The helper reads one JSON payload per line on stdin and writes the
//! analysis into the book's catalog metadata. The password is passed by
//! variable name so it never shows up on a command line we build.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::command::ToolCommand;
use super::MetadataSink;
use crate::domain::{Credentials, Lang, LibraryLocator, MetadataPayload};

/// Default helper invocation
pub fn default_helper() -> Vec<String> {
    vec![
        "python3".to_string(),
        "skills/calibre-metadata-apply/scripts/calibredb_apply.py".to_string(),
    ]
}

/// Metadata-apply helper adapter
pub struct MetadataApply {
    helper: Vec<String>,
    library: LibraryLocator,
    credentials: Credentials,
    lang: Lang,
    timeout: Option<Duration>,
}

impl MetadataApply {
    pub fn new(library: LibraryLocator, credentials: Credentials, lang: Lang) -> Self {
        Self {
            helper: default_helper(),
            library,
            credentials,
            lang,
            timeout: None,
        }
    }

    pub fn with_helper(mut self, helper: Vec<String>) -> Self {
        if !helper.is_empty() {
            self.helper = helper;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the helper invocation for one payload
    pub fn apply_command(&self, payload: &MetadataPayload) -> Result<ToolCommand> {
        let mut line = serde_json::to_string(payload).context("Failed to serialize metadata payload")?;
        line.push('\n');

        let mut cmd = ToolCommand::new("metadata-apply", &self.helper)
            .arg("--with-library")
            .arg(self.library.to_string());

        if let Some(username) = &self.credentials.username {
            cmd = cmd.arg("--username").arg(username.as_str());
        }

        Ok(cmd
            .arg("--password-env")
            .arg(self.credentials.password_env.as_str())
            .arg("--lang")
            .arg(self.lang.to_string())
            .arg("--apply")
            .stdin(line)
            .timeout(self.timeout))
    }
}

#[async_trait]
impl MetadataSink for MetadataApply {
    fn name(&self) -> &str {
        "metadata-apply"
    }

    async fn push(&self, payload: &MetadataPayload) -> Result<()> {
        self.apply_command(payload)?
            .run()
            .await
            .with_context(|| format!("Failed to apply metadata for book {}", payload.id))?;
        Ok(())
    }
}
