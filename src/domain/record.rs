//! Cached analysis records and the payload pushed back into the catalog.

use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::hash::ContentHash;

/// Tags attached to every record the pipeline writes
pub const ANALYSIS_TAGS: [&str; 2] = ["ai-summary", "cached-analysis"];

/// Output language of the analysis text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// Japanese
    #[default]
    Ja,

    /// English
    En,
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lang::Ja => write!(f, "ja"),
            Lang::En => write!(f, "en"),
        }
    }
}

impl std::str::FromStr for Lang {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "ja" | "jp" | "japanese" => Ok(Lang::Ja),
            "en" | "english" => Ok(Lang::En),
            _ => anyhow::bail!("Unknown language: {}", s),
        }
    }
}

/// Book file format as calibre names it (`EPUB`, `AZW3`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BookFormat(String);

impl BookFormat {
    pub fn new(format: impl AsRef<str>) -> Self {
        Self(format.as_ref().trim().trim_start_matches('.').to_uppercase())
    }

    /// Upper-case name, used as part of the cache key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case file extension of exported files
    pub fn extension(&self) -> String {
        self.0.to_lowercase()
    }
}

impl Default for BookFormat {
    fn default() -> Self {
        Self::new("EPUB")
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BookFormat {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<BookFormat> for String {
    fn from(f: BookFormat) -> Self {
        f.0
    }
}

impl std::str::FromStr for BookFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Store key: one record per book and format
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub book_id: u64,
    pub format: BookFormat,
}

impl RecordKey {
    pub fn new(book_id: u64, format: BookFormat) -> Self {
        Self { book_id, format }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.book_id, self.format)
    }
}

/// Pointer back to a passage worth rereading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RereadAnchor {
    /// Section label
    pub section: String,

    /// Locator inside the book (page, CFI, location...)
    #[serde(rename = "page")]
    pub locator: String,

    /// Chunk identifier
    pub chunk_id: String,

    /// Why the passage is worth returning to
    pub reason: String,
}

/// The analysis fields derived from a book's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCore {
    pub summary: String,
    pub highlights: Vec<String>,
    pub reread: Vec<RereadAnchor>,
}

/// A cached analysis, valid while `file_hash` matches the source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub book_id: u64,

    #[serde(default)]
    pub library_id: String,

    #[serde(default)]
    pub title: String,

    pub format: BookFormat,

    /// Algorithm-tagged digest; kept as a raw string so that foreign or
    /// legacy values survive a read
    #[serde(default)]
    pub file_hash: Option<String>,

    #[serde(default)]
    pub lang: Lang,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub highlights: Vec<String>,

    #[serde(default)]
    pub reread: Vec<RereadAnchor>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Set by the store on upsert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    /// Build a fresh record from a completed analysis
    pub fn new(
        key: &RecordKey,
        library_id: impl Into<String>,
        title: impl Into<String>,
        file_hash: &ContentHash,
        lang: Lang,
        core: AnalysisCore,
    ) -> Self {
        Self {
            book_id: key.book_id,
            library_id: library_id.into(),
            title: title.into(),
            format: key.format.clone(),
            file_hash: Some(file_hash.to_string()),
            lang,
            summary: core.summary,
            highlights: core.highlights,
            reread: core.reread,
            tags: ANALYSIS_TAGS.iter().map(|t| t.to_string()).collect(),
            updated_at: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.book_id, self.format.clone())
    }
}

/// Analysis fields as the metadata-apply helper expects them
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPayload {
    pub lang: Lang,
    pub summary: String,
    pub highlights: Vec<String>,
    pub reread: Vec<RereadAnchor>,
    pub tags: Vec<String>,
    pub file_hash: String,
}

/// Stdin payload of the metadata-apply helper
#[derive(Debug, Clone, Serialize)]
pub struct MetadataPayload {
    pub id: u64,
    pub analysis: AnalysisPayload,
}

impl MetadataPayload {
    pub fn from_record(record: &CacheRecord) -> Self {
        Self {
            id: record.book_id,
            analysis: AnalysisPayload {
                lang: record.lang,
                summary: record.summary.clone(),
                highlights: record.highlights.clone(),
                reread: record.reread.clone(),
                tags: record.tags.clone(),
                file_hash: record.file_hash.clone().unwrap_or_default(),
            },
        }
    }
}
