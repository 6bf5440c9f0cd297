//! Catalog reader integration tests against a recording fake tool.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use calibre_lens::adapters::{CatalogTool, ListQuery};
use calibre_lens::core::{CatalogReader, DEFAULT_LIMIT};
use calibre_lens::domain::{BookFormat, CatalogItem, DEFAULT_FIELDS};

/// Returns canned rows and records every query it was asked
struct RecordingTool {
    rows: Vec<CatalogItem>,
    queries: Mutex<Vec<ListQuery>>,
}

impl RecordingTool {
    fn new(ids: &[u64]) -> Self {
        Self {
            rows: ids
                .iter()
                .map(|id| CatalogItem::new(*id, format!("Book {}", id)))
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn last_query(&self) -> ListQuery {
        self.queries.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CatalogTool for RecordingTool {
    fn name(&self) -> &str {
        "recording"
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<CatalogItem>> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.rows.iter().take(query.limit).cloned().collect())
    }

    async fn export(&self, _book_id: u64, _format: &BookFormat, _dest_dir: &Path) -> Result<()> {
        anyhow::bail!("export not supported")
    }
}

#[tokio::test]
async fn test_list_passes_fields_and_limit() {
    let tool = RecordingTool::new(&[1, 2, 3]);
    let reader = CatalogReader::new(&tool);

    let items = reader.list(DEFAULT_FIELDS, 2).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(tool.last_query(), ListQuery::new(DEFAULT_FIELDS, 2));
}

#[tokio::test]
async fn test_search_adds_expression() {
    let tool = RecordingTool::new(&[7]);
    let reader = CatalogReader::new(&tool);

    reader
        .search("authors:\"Le Guin\"", "id,title", DEFAULT_LIMIT)
        .await
        .unwrap();

    let query = tool.last_query();
    assert_eq!(query.search.as_deref(), Some("authors:\"Le Guin\""));
    assert_eq!(query.limit, 100);
}

#[tokio::test]
async fn test_by_id_keeps_only_exact_match() {
    // calibre's id: search can return neighbouring ids
    let tool = RecordingTool::new(&[120, 12, 112]);
    let reader = CatalogReader::new(&tool);

    let item = reader.by_id(12, "id,title").await.unwrap().unwrap();

    assert_eq!(item.id, 12);
    assert_eq!(item.title.as_deref(), Some("Book 12"));
    let query = tool.last_query();
    assert_eq!(query.search.as_deref(), Some("id:12"));
    assert_eq!(query.limit, 5);
}

#[tokio::test]
async fn test_by_id_without_match_is_none() {
    let tool = RecordingTool::new(&[120]);
    let reader = CatalogReader::new(&tool);

    assert!(reader.by_id(12, "id").await.unwrap().is_none());
}
