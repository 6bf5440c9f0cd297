//! Canonical default locations under the calibre-lens home.
//!
//! | Location | Default |
//! |----------|---------|
//! | home | `~/.calibre-lens` |
//! | analysis cache | `<home>/calibre_analysis.sqlite` |
//! | pipeline work area | `<home>/cache/pipeline/<book_id>/` |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Analysis cache database file name
pub const DB_FILE: &str = "calibre_analysis.sqlite";

/// Default home directory (~/.calibre-lens)
pub fn default_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(super::CONFIG_DIR))
}

pub fn default_db(home: &Path) -> PathBuf {
    home.join(DB_FILE)
}

pub fn default_cache_dir(home: &Path) -> PathBuf {
    home.join("cache").join("pipeline")
}
