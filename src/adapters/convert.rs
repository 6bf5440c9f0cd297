//! `ebook-convert` adapter for plain-text extraction.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use super::command::ToolCommand;
use super::TextExtractor;

/// ebook-convert adapter
pub struct EbookConvert {
    binary: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for EbookConvert {
    fn default() -> Self {
        Self::new()
    }
}

impl EbookConvert {
    pub fn new() -> Self {
        Self {
            binary: vec!["ebook-convert".to_string()],
            timeout: None,
        }
    }

    pub fn with_binary(mut self, binary: Vec<String>) -> Self {
        if !binary.is_empty() {
            self.binary = binary;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Decode converter output, dropping bytes that aren't valid UTF-8
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).replace('\u{FFFD}', ""),
    }
}

#[async_trait]
impl TextExtractor for EbookConvert {
    fn name(&self) -> &str {
        "ebook-convert"
    }

    async fn extract(&self, source: &Path, dest: &Path) -> Result<String> {
        let dir = dest.parent().unwrap_or(Path::new("."));

        // ebook-convert picks the output format from the extension, so the
        // staging file keeps `.txt`; it only replaces `dest` once complete
        let staging = tempfile::Builder::new()
            .prefix(".convert-")
            .suffix(".txt")
            .tempfile_in(dir)
            .with_context(|| format!("Failed to create staging file in {}", dir.display()))?;

        ToolCommand::new("ebook-convert", &self.binary)
            .arg(source.to_string_lossy().to_string())
            .arg(staging.path().to_string_lossy().to_string())
            .timeout(self.timeout)
            .run()
            .await?;

        staging
            .persist(dest)
            .with_context(|| format!("Failed to move extracted text to {}", dest.display()))?;

        let bytes = fs::read(dest)
            .await
            .with_context(|| format!("Failed to read extracted text: {}", dest.display()))?;

        Ok(decode_text(&bytes))
    }
}
