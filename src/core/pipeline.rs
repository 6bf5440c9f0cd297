//! Hash-gated analysis pipeline.
//!
//! One run handles one book:
//!
//! ```text
//! lookup title → export → hash → gate ─ same hash ─→ Skipped
//!                                  └─ otherwise ─→ extract → analyse → upsert → push → Updated
//! ```
//!
//! The cache write and the metadata push happen only after everything
//! before them succeeded, and the push happens at most once per run.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{CatalogTool, MetadataSink, TextExtractor};
use crate::cache::AnalysisStore;
use crate::domain::{
    BookFormat, CacheRecord, ContentHash, HashError, Lang, LibraryLocator, MetadataPayload,
    RecordKey,
};

use super::analysis::{analyze, load_analysis};
use super::catalog::CatalogReader;
use super::gate::{self, GateDecision};
use super::workspace::BookWorkspace;

/// Columns fetched for the title lookup
const LOOKUP_FIELDS: &str = "id,title";

const LOOKUP_LIMIT: usize = 2;

/// Errors from a pipeline run, one variant per failing stage
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("book not found: {0}")]
    BookNotFound(u64),

    #[error("catalog lookup failed: {0:#}")]
    Catalog(anyhow::Error),

    #[error("workspace error: {0:#}")]
    Workspace(anyhow::Error),

    #[error("export failed: {0:#}")]
    Export(anyhow::Error),

    #[error("no exported {0}")]
    NoExport(BookFormat),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error("cache read failed: {0:#}")]
    CacheRead(anyhow::Error),

    #[error("text extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error("analysis input rejected: {0:#}")]
    AnalysisInput(anyhow::Error),

    #[error("cache write failed: {0:#}")]
    CacheWrite(anyhow::Error),

    #[error("metadata push failed: {0:#}")]
    Propagation(anyhow::Error),
}

/// Everything a run needs to know about the book
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub book_id: u64,
    pub library: LibraryLocator,
    pub format: BookFormat,
    pub lang: Lang,

    /// Parent of the per-book working directories
    pub cache_dir: PathBuf,

    /// Pre-computed analysis to use instead of the built-in one
    pub analysis_json: Option<PathBuf>,
}

impl AnalysisJob {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.book_id, self.format.clone())
    }
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PipelineOutcome {
    /// Stored analysis matched the file; nothing was written
    Skipped {
        ok: bool,
        skipped: bool,
        reason: &'static str,
        book_id: u64,
        file_hash: String,
    },

    /// Analysis recomputed, cached and pushed
    Updated {
        ok: bool,
        book_id: u64,
        title: String,
        file_hash: String,
        updated: bool,
    },
}

impl PipelineOutcome {
    fn skipped(book_id: u64, file_hash: &ContentHash) -> Self {
        Self::Skipped {
            ok: true,
            skipped: true,
            reason: "same_hash",
            book_id,
            file_hash: file_hash.to_string(),
        }
    }

    fn updated(book_id: u64, title: String, file_hash: &ContentHash) -> Self {
        Self::Updated {
            ok: true,
            book_id,
            title,
            file_hash: file_hash.to_string(),
            updated: true,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn file_hash(&self) -> &str {
        match self {
            Self::Skipped { file_hash, .. } | Self::Updated { file_hash, .. } => file_hash,
        }
    }
}

/// Analysis pipeline wired to its external collaborators
pub struct AnalysisPipeline {
    catalog: Box<dyn CatalogTool>,
    extractor: Box<dyn TextExtractor>,
    store: Box<dyn AnalysisStore>,
    sink: Box<dyn MetadataSink>,
}

impl AnalysisPipeline {
    pub fn new(
        catalog: Box<dyn CatalogTool>,
        extractor: Box<dyn TextExtractor>,
        store: Box<dyn AnalysisStore>,
        sink: Box<dyn MetadataSink>,
    ) -> Self {
        Self {
            catalog,
            extractor,
            store,
            sink,
        }
    }

    /// Run the pipeline for one book
    #[instrument(skip(self, job), fields(book_id = job.book_id, format = %job.format))]
    pub async fn run(&self, job: &AnalysisJob) -> Result<PipelineOutcome, PipelineError> {
        let title = self.lookup_title(job.book_id).await?;
        info!(%title, "Book found");

        let workspace =
            BookWorkspace::open(&job.cache_dir, job.book_id).map_err(PipelineError::Workspace)?;
        let _lock = workspace.lock().map_err(PipelineError::Workspace)?;

        // Export and hash
        workspace
            .clear_exports(&job.format)
            .map_err(PipelineError::Workspace)?;
        self.catalog
            .export(job.book_id, &job.format, workspace.dir())
            .await
            .map_err(PipelineError::Export)?;
        let source = workspace
            .find_export(&job.format)
            .map_err(PipelineError::Workspace)?
            .ok_or_else(|| PipelineError::NoExport(job.format.clone()))?;
        let file_hash = ContentHash::of_file(&source).await?;
        debug!(source = %source.display(), %file_hash, "Export hashed");

        // Gate
        let key = job.key();
        let stored = self
            .store
            .status(&key)
            .await
            .map_err(PipelineError::CacheRead)?;
        match gate::check(&file_hash, stored.as_ref()) {
            GateDecision::Skip => {
                info!(%file_hash, "Content unchanged, skipping analysis");
                return Ok(PipelineOutcome::skipped(job.book_id, &file_hash));
            }
            GateDecision::Recompute(reason) => {
                info!(%reason, "Recomputing analysis");
            }
        }

        // Extract and analyse
        let text = self
            .extractor
            .extract(&source, &workspace.text_path())
            .await
            .map_err(PipelineError::Extraction)?;
        if text.trim().is_empty() {
            warn!("Extracted text is empty");
        }

        let core = match &job.analysis_json {
            Some(path) => load_analysis(path)
                .await
                .map_err(PipelineError::AnalysisInput)?,
            None => analyze(&text, job.lang),
        };

        let record = CacheRecord::new(
            &key,
            job.library.library_id(),
            title.clone(),
            &file_hash,
            job.lang,
            core,
        );

        // Persist, then propagate
        self.store
            .upsert(&record)
            .await
            .map_err(PipelineError::CacheWrite)?;
        info!(store = self.store.name(), "Cache record written");

        self.sink
            .push(&MetadataPayload::from_record(&record))
            .await
            .map_err(PipelineError::Propagation)?;
        info!(sink = self.sink.name(), "Metadata pushed");

        Ok(PipelineOutcome::updated(job.book_id, title, &file_hash))
    }

    async fn lookup_title(&self, book_id: u64) -> Result<String, PipelineError> {
        let item = CatalogReader::new(self.catalog.as_ref())
            .find(book_id, LOOKUP_FIELDS, LOOKUP_LIMIT)
            .await
            .map_err(PipelineError::Catalog)?
            .ok_or(PipelineError::BookNotFound(book_id))?;

        Ok(item.title.unwrap_or_default())
    }
}
