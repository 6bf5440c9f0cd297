//! Catalog reads: `list`, `search` and single-book lookup.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::adapters::{CatalogTool, ListQuery};
use crate::domain::{CatalogItem, DEFAULT_FIELDS, DEFAULT_ID_FIELDS};

/// Default row limit for listings and searches
pub const DEFAULT_LIMIT: usize = 100;

/// Row limit for id lookups; a few extra rows guard against fuzzy matches
const ID_LOOKUP_LIMIT: usize = 5;

/// Thin query layer over a [`CatalogTool`]
pub struct CatalogReader<'a> {
    tool: &'a dyn CatalogTool,
}

impl<'a> CatalogReader<'a> {
    pub fn new(tool: &'a dyn CatalogTool) -> Self {
        Self { tool }
    }

    /// Resolve the column list, falling back to `default`
    pub fn fields_or(fields: Option<&str>, default: &str) -> String {
        fields
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    /// List the first `limit` books
    #[instrument(skip(self))]
    pub async fn list(&self, fields: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        self.tool.list(&ListQuery::new(fields, limit)).await
    }

    /// Run a calibre search expression
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, fields: &str, limit: usize) -> Result<Vec<CatalogItem>> {
        self.tool
            .list(&ListQuery::new(fields, limit).with_search(query))
            .await
    }

    /// Fetch exactly one book by id, `None` when the catalog has no such id
    pub async fn by_id(&self, book_id: u64, fields: &str) -> Result<Option<CatalogItem>> {
        self.find(book_id, fields, ID_LOOKUP_LIMIT).await
    }

    /// Search `id:N` and keep the row whose id is exactly `book_id`
    #[instrument(skip(self))]
    pub async fn find(&self, book_id: u64, fields: &str, limit: usize) -> Result<Option<CatalogItem>> {
        let query = ListQuery::new(fields, limit).with_search(format!("id:{}", book_id));
        let rows = self.tool.list(&query).await?;
        debug!(rows = rows.len(), "Id lookup returned");

        Ok(rows.into_iter().find(|row| row.id == book_id))
    }

    /// Default columns for an id lookup
    pub fn id_fields(fields: Option<&str>) -> String {
        Self::fields_or(fields, DEFAULT_ID_FIELDS)
    }

    /// Default columns for list and search
    pub fn list_fields(fields: Option<&str>) -> String {
        Self::fields_or(fields, DEFAULT_FIELDS)
    }
}
