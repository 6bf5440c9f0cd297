//! Configuration for calibre-lens.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of this module)
//! 2. Environment variables (CALIBRE_LENS_HOME, CALIBRE_LENS_DB)
//! 3. Config file (.calibre-lens/config.yaml)
//! 4. Defaults (~/.calibre-lens)
//!
//! Config file discovery:
//! - Searches current directory and parents for .calibre-lens/config.yaml
//! - `paths.home` is relative to the .calibre-lens directory, other paths
//!   to the project root (the directory containing .calibre-lens)

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::metadata::default_helper;
use crate::domain::{BookFormat, Credentials, Lang, LibraryLocator, DEFAULT_PASSWORD_ENV};

/// Directory holding the config file
pub const CONFIG_DIR: &str = ".calibre-lens";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .calibre-lens/)
    pub home: Option<String>,
    /// Analysis cache database (relative to project root)
    pub db: Option<String>,
    /// Export/extraction working area (relative to project root)
    pub cache_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryConfig {
    /// Library locator, e.g. http://HOST:PORT/#LIBRARY_ID
    pub url: Option<String>,
    pub username: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub calibredb: Option<Vec<String>>,
    pub ebook_convert: Option<Vec<String>>,
    pub metadata_apply: Option<Vec<String>>,
    /// External cache helper; unset means the built-in SQLite store
    pub cache_helper: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    pub format: Option<String>,
    pub lang: Option<String>,
}

/// External tool invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSettings {
    pub calibredb: Vec<String>,
    pub ebook_convert: Vec<String>,
    pub metadata_apply: Vec<String>,
    pub cache_helper: Option<Vec<String>>,
    pub timeout_seconds: Option<u64>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            calibredb: vec!["calibredb".to_string()],
            ebook_convert: vec!["ebook-convert".to_string()],
            metadata_apply: default_helper(),
            cache_helper: None,
            timeout_seconds: None,
        }
    }
}

impl ToolSettings {
    /// Per-invocation timeout; zero disables it
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite analysis cache
    pub db: PathBuf,
    /// Parent of per-book working directories
    pub cache_dir: PathBuf,
    /// Library locator, if configured
    pub library: Option<LibraryLocator>,
    pub credentials: Credentials,
    pub tools: ToolSettings,
    pub format: BookFormat,
    pub lang: Lang,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge defaults, an optional config file and environment lookups
fn resolve(
    default_home: PathBuf,
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), Some(config)),
        None => (None, None),
    };

    // Base directory is the parent of .calibre-lens/ (the project root)
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));
    let base_dir = config_dir.parent().unwrap_or(Path::new("."));

    let paths = config.as_ref().map(|c| c.paths.clone()).unwrap_or_default();
    let library = config.as_ref().map(|c| c.library.clone()).unwrap_or_default();
    let tools = config.as_ref().map(|c| c.tools.clone()).unwrap_or_default();
    let pipeline = config.as_ref().map(|c| c.pipeline.clone()).unwrap_or_default();

    let home = if let Some(env_home) = env("CALIBRE_LENS_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = paths.home {
        resolve_path(config_dir, home_path)
    } else {
        default_home
    };

    let db = if let Some(env_db) = env("CALIBRE_LENS_DB") {
        PathBuf::from(env_db)
    } else if let Some(ref db_path) = paths.db {
        resolve_path(base_dir, db_path)
    } else {
        paths::default_db(&home)
    };

    let cache_dir = match paths.cache_dir {
        Some(ref dir) => resolve_path(base_dir, dir),
        None => paths::default_cache_dir(&home),
    };

    let defaults = ToolSettings::default();
    let tools = ToolSettings {
        calibredb: tools.calibredb.unwrap_or(defaults.calibredb),
        ebook_convert: tools.ebook_convert.unwrap_or(defaults.ebook_convert),
        metadata_apply: tools.metadata_apply.unwrap_or(defaults.metadata_apply),
        cache_helper: tools.cache_helper.filter(|h| !h.is_empty()),
        timeout_seconds: tools.timeout_seconds,
    };

    let lang = match pipeline.lang {
        Some(ref lang) => lang
            .parse::<Lang>()
            .with_context(|| format!("Invalid pipeline.lang in config: {}", lang))?,
        None => Lang::default(),
    };

    Ok(ResolvedConfig {
        home,
        db,
        cache_dir,
        library: library.url.map(LibraryLocator::new),
        credentials: Credentials::new(
            library.username,
            library
                .password_env
                .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string()),
        ),
        tools,
        format: pipeline.format.map(BookFormat::new).unwrap_or_default(),
        lang,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Load configuration, discovering the config file from `start`
pub fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    let file = match find_config_file(start) {
        Some(path) => {
            let parsed = load_config_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    resolve(paths::default_home()?, file, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
