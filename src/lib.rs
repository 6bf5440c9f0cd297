//! calibre-lens - calibre catalog reader and hash-gated book analysis
//!
//! Drives `calibredb`, `ebook-convert` and a metadata-apply helper as
//! subprocesses to read a calibre library and to attach a short analysis
//! to each book's metadata.
//!
//! # Content-hash gate
//!
//! Every analysis is cached together with the SHA-256 digest of the file
//! it was computed from. A later run exports the book again, hashes it and
//! skips all further work when the digest is unchanged:
//! - Same bytes: nothing is extracted, written or pushed
//! - Changed bytes or no record: full recompute, one cache write, one push
//!
//! # Modules
//!
//! - `adapters`: Subprocess tools (calibredb, ebook-convert, metadata helper)
//! - `cache`: Analysis cache stores (SQLite, helper process)
//! - `core`: Catalog reads, gate, analysis and the pipeline
//! - `domain`: Data structures (CatalogItem, CacheRecord, ContentHash)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Read the catalog
//! calibre-lens list --with-library 'http://nas:8080/#Books'
//! calibre-lens id --with-library 'http://nas:8080/#Books' --book-id 42
//!
//! # Analyse a book (skipped when the file is unchanged)
//! calibre-lens analyze --with-library 'http://nas:8080/#Books' --book-id 42
//! ```

pub mod adapters;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use cache::{AnalysisStore, CommandStore, SqliteStore};
pub use core::{AnalysisJob, AnalysisPipeline, CatalogReader, PipelineError, PipelineOutcome};
pub use domain::{BookFormat, CacheRecord, CatalogItem, ContentHash, Lang, LibraryLocator};
