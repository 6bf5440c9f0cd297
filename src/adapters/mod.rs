//! Adapter interfaces for external tools.
//!
//! Everything calibre-lens does to a library goes through a subprocess:
//! `calibredb` for reads and exports, `ebook-convert` for text extraction
//! and a metadata-apply helper for writing results back. Each concern sits
//! behind a trait so the pipeline can be driven by fakes in tests.

pub mod calibredb;
pub mod command;
pub mod convert;
pub mod metadata;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{BookFormat, CatalogItem, MetadataPayload};

// Re-export the concrete adapters
pub use calibredb::CalibreDb;
pub use command::{render_command, ToolCommand, ToolError};
pub use convert::EbookConvert;
pub use metadata::MetadataApply;

/// A `calibredb list` query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Comma-separated column names
    pub fields: String,

    /// calibre search expression
    pub search: Option<String>,

    /// Maximum number of rows
    pub limit: usize,
}

impl ListQuery {
    pub fn new(fields: impl Into<String>, limit: usize) -> Self {
        Self {
            fields: fields.into(),
            search: None,
            limit,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// Read and export access to a calibre library
#[async_trait]
pub trait CatalogTool: Send + Sync {
    /// Human-readable tool name
    fn name(&self) -> &str;

    /// Run a machine-readable listing
    async fn list(&self, query: &ListQuery) -> Result<Vec<CatalogItem>>;

    /// Export one format of a book into `dest_dir`
    async fn export(&self, book_id: u64, format: &BookFormat, dest_dir: &Path) -> Result<()>;
}

/// Converts a book file to plain text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Convert `source` into `dest` and return the text
    async fn extract(&self, source: &Path, dest: &Path) -> Result<String>;
}

/// Pushes analysis results back into catalog metadata
#[async_trait]
pub trait MetadataSink: Send + Sync {
    fn name(&self) -> &str;

    async fn push(&self, payload: &MetadataPayload) -> Result<()>;
}
