//! Content-hash gate integration tests.
//!
//! Drives the full pipeline with in-process fakes for calibredb,
//! ebook-convert and the metadata helper, and a real SQLite cache.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use calibre_lens::adapters::{CatalogTool, ListQuery, MetadataSink, TextExtractor};
use calibre_lens::cache::{AnalysisStore, SqliteStore};
use calibre_lens::cli::Report;
use calibre_lens::core::{AnalysisJob, AnalysisPipeline, PipelineError, PipelineOutcome};
use calibre_lens::domain::{
    BookFormat, CatalogItem, ContentHash, Lang, LibraryLocator, MetadataPayload, RecordKey,
};

const HELLO_DIGEST: &str =
    "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

/// Call counters shared between the fakes and the test
#[derive(Default)]
struct Calls {
    exports: AtomicUsize,
    extracts: AtomicUsize,
    pushes: AtomicUsize,
    pushed: Mutex<Vec<MetadataPayload>>,
}

impl Calls {
    fn exports(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }
    fn extracts(&self) -> usize {
        self.extracts.load(Ordering::SeqCst)
    }
    fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

/// Catalog holding one book whose file bytes the test can change
struct FakeCatalog {
    book: CatalogItem,
    content: Arc<Mutex<Option<Vec<u8>>>>,
    calls: Arc<Calls>,
}

#[async_trait]
impl CatalogTool for FakeCatalog {
    fn name(&self) -> &str {
        "fake-calibredb"
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<CatalogItem>> {
        // Mimic calibre's fuzzy id search: return a neighbour first
        let mut rows = vec![CatalogItem::new(self.book.id + 100, "Neighbour")];
        if query.search.as_deref() == Some(format!("id:{}", self.book.id).as_str()) {
            rows.push(self.book.clone());
        }
        Ok(rows)
    }

    async fn export(&self, _book_id: u64, format: &BookFormat, dest_dir: &Path) -> Result<()> {
        self.calls.exports.fetch_add(1, Ordering::SeqCst);
        if let Some(bytes) = self.content.lock().unwrap().clone() {
            let name = format!("Pirates - Anon.{}", format.extension());
            std::fs::write(dest_dir.join(name), bytes)?;
        }
        Ok(())
    }
}

struct FakeExtractor {
    calls: Arc<Calls>,
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake-convert"
    }

    async fn extract(&self, _source: &Path, dest: &Path) -> Result<String> {
        self.calls.extracts.fetch_add(1, Ordering::SeqCst);
        let text = "目次\n第1章 海賊の歴史\n";
        std::fs::write(dest, text)?;
        Ok(text.to_string())
    }
}

struct FakeSink {
    calls: Arc<Calls>,
    fail: bool,
}

#[async_trait]
impl MetadataSink for FakeSink {
    fn name(&self) -> &str {
        "fake-apply"
    }

    async fn push(&self, payload: &MetadataPayload) -> Result<()> {
        self.calls.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("helper failed (2)");
        }
        self.calls.pushed.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

struct Harness {
    temp: TempDir,
    db: std::path::PathBuf,
    job: AnalysisJob,
    content: Arc<Mutex<Option<Vec<u8>>>>,
    calls: Arc<Calls>,
}

impl Harness {
    fn new(book_id: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let job = AnalysisJob {
            book_id,
            library: LibraryLocator::new("http://nas:8080/#Books"),
            format: BookFormat::default(),
            lang: Lang::Ja,
            cache_dir: temp.path().join("pipeline"),
            analysis_json: None,
        };
        Self {
            db: temp.path().join("analysis.sqlite"),
            temp,
            job,
            content: Arc::new(Mutex::new(None)),
            calls: Arc::new(Calls::default()),
        }
    }

    /// Bytes the next export produces
    fn set_content(&self, bytes: &[u8]) {
        *self.content.lock().unwrap() = Some(bytes.to_vec());
    }

    /// Make the next export produce no file
    fn clear_content(&self) {
        *self.content.lock().unwrap() = None;
    }

    fn pipeline(&self, failing_sink: bool) -> AnalysisPipeline {
        AnalysisPipeline::new(
            Box::new(FakeCatalog {
                book: CatalogItem::new(self.job.book_id, "海賊の歴史"),
                content: Arc::clone(&self.content),
                calls: Arc::clone(&self.calls),
            }),
            Box::new(FakeExtractor {
                calls: Arc::clone(&self.calls),
            }),
            Box::new(SqliteStore::new(&self.db)),
            Box::new(FakeSink {
                calls: Arc::clone(&self.calls),
                fail: failing_sink,
            }),
        )
    }

    async fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        self.pipeline(false).run(&self.job).await
    }

    async fn stored_hash(&self) -> Option<String> {
        SqliteStore::new(&self.db)
            .status(&RecordKey::new(self.job.book_id, self.job.format.clone()))
            .await
            .unwrap()
            .and_then(|r| r.file_hash)
    }
}

#[tokio::test]
async fn test_first_run_without_record_recomputes() {
    let h = Harness::new(4);
    h.set_content(b"hello");

    let outcome = h.run().await.unwrap();

    assert!(!outcome.is_skipped());
    assert_eq!(outcome.file_hash(), HELLO_DIGEST);
    assert_eq!(h.calls.extracts(), 1);
    assert_eq!(h.calls.pushes(), 1);
    assert_eq!(h.stored_hash().await.as_deref(), Some(HELLO_DIGEST));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["title"], "海賊の歴史");
    assert_eq!(json["updated"], true);
}

#[tokio::test]
async fn test_same_bytes_skip_without_push() {
    let h = Harness::new(4);
    h.set_content(b"hello");
    h.run().await.unwrap();

    let outcome = h.run().await.unwrap();

    assert!(outcome.is_skipped());
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        serde_json::json!({
            "ok": true,
            "skipped": true,
            "reason": "same_hash",
            "book_id": 4,
            "file_hash": HELLO_DIGEST,
        })
    );
    assert_eq!(h.calls.exports(), 2);
    assert_eq!(h.calls.extracts(), 1);
    assert_eq!(h.calls.pushes(), 1);
}

#[tokio::test]
async fn test_skip_line_keeps_field_order() {
    let h = Harness::new(4);
    h.set_content(b"hello");
    h.run().await.unwrap();

    let outcome = h.run().await.unwrap();
    let line = Report::compact(&outcome).unwrap().render();

    assert_eq!(
        line,
        format!(
            r#"{{"ok":true,"skipped":true,"reason":"same_hash","book_id":4,"file_hash":"{}"}}"#,
            HELLO_DIGEST
        )
    );
}

#[tokio::test]
async fn test_changed_bytes_recompute_and_push_once() {
    let h = Harness::new(4);
    h.set_content(b"hello");
    h.run().await.unwrap();
    h.run().await.unwrap();

    h.set_content(b"hello!");
    let outcome = h.run().await.unwrap();

    let expected = ContentHash::of_bytes(b"hello!").to_string();
    assert!(!outcome.is_skipped());
    assert_eq!(outcome.file_hash(), expected);
    assert_eq!(h.stored_hash().await, Some(expected.clone()));
    assert_eq!(h.calls.pushes(), 2);

    let pushed = h.calls.pushed.lock().unwrap();
    let last = pushed.last().unwrap();
    assert_eq!(last.id, 4);
    assert_eq!(last.analysis.file_hash, expected);
    assert!(last.analysis.tags.contains(&"ai-summary".to_string()));
}

#[tokio::test]
async fn test_foreign_digest_is_recomputed() {
    let h = Harness::new(6);
    h.set_content(b"hello");
    h.run().await.unwrap();

    let store = SqliteStore::new(&h.db);
    let key = RecordKey::new(6, BookFormat::default());
    let mut record = store.status(&key).await.unwrap().unwrap();
    record.file_hash = Some("md5:5d41402abc4b2a76b9719d911017c592".to_string());
    store.upsert(&record).await.unwrap();

    let outcome = h.run().await.unwrap();
    assert!(!outcome.is_skipped());
    assert_eq!(h.stored_hash().await.as_deref(), Some(HELLO_DIGEST));
}

#[tokio::test]
async fn test_empty_export_fails_before_cache() {
    let h = Harness::new(4);
    h.set_content(b"");

    let err = h.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Hash(_)), "got {err}");
    assert_eq!(h.calls.extracts(), 0);
    assert_eq!(h.calls.pushes(), 0);
    assert!(h.stored_hash().await.is_none());
}

#[tokio::test]
async fn test_missing_export_names_format() {
    let h = Harness::new(4);
    h.clear_content();

    let err = h.run().await.unwrap_err();
    assert_eq!(err.to_string(), "no exported EPUB");
}

#[tokio::test]
async fn test_unknown_book_is_not_found() {
    let h = Harness::new(4);
    h.set_content(b"hello");
    let mut job = h.job.clone();
    job.book_id = 5;

    let err = h.pipeline(false).run(&job).await.unwrap_err();

    assert!(matches!(err, PipelineError::BookNotFound(5)));
    assert_eq!(h.calls.exports(), 0);
}

#[tokio::test]
async fn test_push_failure_surfaces_after_cache_write() {
    let h = Harness::new(4);
    h.set_content(b"hello");

    let err = h.pipeline(true).run(&h.job).await.unwrap_err();

    assert!(matches!(err, PipelineError::Propagation(_)));
    assert!(err.to_string().contains("helper failed (2)"));
    assert_eq!(h.stored_hash().await.as_deref(), Some(HELLO_DIGEST));
}

#[tokio::test]
async fn test_precomputed_analysis_is_used() {
    let h = Harness::new(4);
    h.set_content(b"hello");
    let analysis = h.temp.path().join("analysis.json");
    std::fs::write(
        &analysis,
        r#"{"summary": "手書きの要約", "highlights": ["a"], "reread": []}"#,
    )
    .unwrap();

    let mut job = h.job.clone();
    job.analysis_json = Some(analysis);
    h.pipeline(false).run(&job).await.unwrap();

    let pushed = h.calls.pushed.lock().unwrap();
    assert_eq!(pushed[0].analysis.summary, "手書きの要約");
    assert_eq!(pushed[0].analysis.highlights, vec!["a".to_string()]);
}
