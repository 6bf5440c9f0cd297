//! Per-book working directory under the pipeline cache dir.
//!
//! Layout:
//!
//! ```text
//! <cache_dir>/<book_id>/
//! ├── .lock            # advisory lock held for the whole run
//! ├── <exported>.epub  # calibredb export (one per format)
//! └── book_<id>.txt    # ebook-convert output
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use glob::Pattern;
use tracing::debug;

use crate::domain::BookFormat;

/// Working directory for one book
#[derive(Debug)]
pub struct BookWorkspace {
    book_id: u64,
    dir: PathBuf,
}

/// Exclusive hold on a book's workspace; released on drop
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl BookWorkspace {
    /// Create `<cache_dir>/<book_id>` if needed
    pub fn open(cache_dir: &Path, book_id: u64) -> Result<Self> {
        let dir = cache_dir.join(book_id.to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create work directory: {}", dir.display()))?;
        Ok(Self { book_id, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Block until no other run holds this book, then hold it.
    ///
    /// Covers the whole status-then-upsert sequence so two runs on the same
    /// book can't interleave exports or cache writes.
    pub fn lock(&self) -> Result<WorkspaceLock> {
        let path = self.dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire lock on {}", path.display()))?;

        Ok(WorkspaceLock { file })
    }

    /// Files of `format` currently in the workspace, sorted by name
    pub fn exports(&self, format: &BookFormat) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.{}",
            Pattern::escape(&self.dir.to_string_lossy()),
            Pattern::escape(&format.extension())
        );

        let mut paths = Vec::new();
        for entry in glob::glob(&pattern).context("Invalid export pattern")? {
            let path = entry.context("Failed to read work directory")?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Remove exports left over from an earlier run
    pub fn clear_exports(&self, format: &BookFormat) -> Result<()> {
        for stale in self.exports(format)? {
            debug!(path = %stale.display(), "Removing stale export");
            std::fs::remove_file(&stale)
                .with_context(|| format!("Failed to remove stale export: {}", stale.display()))?;
        }
        Ok(())
    }

    /// The exported file of `format`, if calibredb produced one
    pub fn find_export(&self, format: &BookFormat) -> Result<Option<PathBuf>> {
        Ok(self.exports(format)?.into_iter().next())
    }

    /// Destination of the extracted text
    pub fn text_path(&self) -> PathBuf {
        self.dir.join(format!("book_{}.txt", self.book_id))
    }
}
