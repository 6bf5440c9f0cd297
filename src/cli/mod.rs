//! Command-line interface for calibre-lens.
//!
//! Provides catalog reads (`list`, `search`, `id`), the hash-gated
//! `analyze` pipeline, direct access to the analysis cache and a
//! configuration dump. Every command returns a JSON [`Report`] that the
//! binary prints to stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::adapters::{CalibreDb, EbookConvert, MetadataApply};
use crate::cache::{AnalysisStore, CommandStore, SqliteStore};
use crate::config::{self, ResolvedConfig};
use crate::core::{AnalysisJob, AnalysisPipeline, CatalogReader, DEFAULT_LIMIT};
use crate::domain::{BookFormat, Credentials, Lang, LibraryLocator};

pub mod cache;
pub mod output;

pub use output::Report;

use output::{IdReport, ListReport, SearchReport};

/// calibre-lens - calibre catalog reader and cached book analysis
#[derive(Parser, Debug)]
#[command(name = "calibre-lens")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Library location and credentials shared by every catalog command
#[derive(Args, Debug, Clone)]
pub struct LibraryArgs {
    /// Library path or http://HOST:PORT/#LIBRARY_ID
    #[arg(long = "with-library", env = "CALIBRE_LENS_LIBRARY")]
    pub with_library: Option<String>,

    /// Content server username
    #[arg(long)]
    pub username: Option<String>,

    /// Environment variable holding the content server password
    #[arg(long)]
    pub password_env: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List books
    List {
        #[command(flatten)]
        library: LibraryArgs,

        /// Comma-separated columns
        #[arg(long)]
        fields: Option<String>,

        /// Maximum number of books
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Search books with a calibre search expression
    Search {
        #[command(flatten)]
        library: LibraryArgs,

        /// Search expression, e.g. "title:foo"
        #[arg(long)]
        query: String,

        /// Comma-separated columns
        #[arg(long)]
        fields: Option<String>,

        /// Maximum number of books
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Show one book by id
    Id {
        #[command(flatten)]
        library: LibraryArgs,

        #[arg(long)]
        book_id: u64,

        /// Comma-separated columns
        #[arg(long)]
        fields: Option<String>,
    },

    /// Analyse a book unless its content is unchanged since the last run
    Analyze(AnalyzeArgs),

    /// Inspect or write the analysis cache
    Cache {
        #[command(subcommand)]
        command: cache::CacheCommands,
    },

    /// Show resolved configuration
    Config,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub library: LibraryArgs,

    #[arg(long)]
    pub book_id: u64,

    /// Analysis cache database
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Parent of per-book working directories
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Book format to export and hash
    #[arg(long)]
    pub format: Option<String>,

    #[arg(long, value_enum)]
    pub lang: Option<Lang>,

    /// Use this analysis (summary, highlights, reread) instead of the built-in one
    #[arg(long)]
    pub analysis_json: Option<PathBuf>,
}

impl LibraryArgs {
    /// Locator and credentials, flags first, then configuration
    fn resolve(&self, cfg: &ResolvedConfig) -> Result<(LibraryLocator, Credentials)> {
        let library = match self.with_library.as_deref().filter(|l| !l.is_empty()) {
            Some(locator) => LibraryLocator::new(locator),
            None => cfg
                .library
                .clone()
                .context("No library given: pass --with-library or set library.url in config")?,
        };

        let credentials = Credentials::new(
            self.username.clone().or_else(|| cfg.credentials.username.clone()),
            self.password_env
                .clone()
                .unwrap_or_else(|| cfg.credentials.password_env.clone()),
        );

        Ok((library, credentials))
    }

    fn calibredb(&self, cfg: &ResolvedConfig) -> Result<CalibreDb> {
        let (library, credentials) = self.resolve(cfg)?;
        Ok(CalibreDb::new(library, credentials)
            .with_binary(cfg.tools.calibredb.clone())
            .with_timeout(cfg.tools.timeout()))
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<Report> {
        match self.command {
            Commands::List {
                library,
                fields,
                limit,
            } => list_books(&library, fields.as_deref(), limit).await,
            Commands::Search {
                library,
                query,
                fields,
                limit,
            } => search_books(&library, query, fields.as_deref(), limit).await,
            Commands::Id {
                library,
                book_id,
                fields,
            } => show_book(&library, book_id, fields.as_deref()).await,
            Commands::Analyze(args) => analyze_book(args).await,
            Commands::Cache { command } => cache::execute(command).await,
            Commands::Config => show_config(),
        }
    }
}

/// List the first `limit` books
async fn list_books(library: &LibraryArgs, fields: Option<&str>, limit: usize) -> Result<Report> {
    let cfg = config::config()?;
    let tool = library.calibredb(cfg)?;
    let fields = CatalogReader::list_fields(fields);

    let items = CatalogReader::new(&tool).list(&fields, limit).await?;
    Report::pretty(ListReport::new(fields, items))
}

/// Search books
async fn search_books(
    library: &LibraryArgs,
    query: String,
    fields: Option<&str>,
    limit: usize,
) -> Result<Report> {
    let cfg = config::config()?;
    let tool = library.calibredb(cfg)?;
    let fields = CatalogReader::list_fields(fields);

    let items = CatalogReader::new(&tool)
        .search(&query, &fields, limit)
        .await?;
    Report::pretty(SearchReport::new(query, fields, items))
}

/// Show one book; a missing id is reported as `"item": null`
async fn show_book(library: &LibraryArgs, book_id: u64, fields: Option<&str>) -> Result<Report> {
    let cfg = config::config()?;
    let tool = library.calibredb(cfg)?;
    let fields = CatalogReader::id_fields(fields);

    let item = CatalogReader::new(&tool).by_id(book_id, &fields).await?;
    Report::pretty(IdReport::new(book_id, item))
}

/// Run the analysis pipeline for one book
async fn analyze_book(args: AnalyzeArgs) -> Result<Report> {
    let cfg = config::config()?;
    let (library, credentials) = args.library.resolve(cfg)?;
    let timeout = cfg.tools.timeout();

    let lang = args.lang.unwrap_or(cfg.lang);
    let format = args
        .format
        .as_deref()
        .map(BookFormat::new)
        .unwrap_or_else(|| cfg.format.clone());
    let db = args.db.unwrap_or_else(|| cfg.db.clone());

    let store: Box<dyn AnalysisStore> = match &cfg.tools.cache_helper {
        Some(helper) => Box::new(CommandStore::new(helper.clone(), &db).with_timeout(timeout)),
        None => Box::new(SqliteStore::new(&db)),
    };
    debug!(store = store.name(), db = %db.display(), "Cache store selected");

    let pipeline = AnalysisPipeline::new(
        Box::new(
            CalibreDb::new(library.clone(), credentials.clone())
                .with_binary(cfg.tools.calibredb.clone())
                .with_timeout(timeout),
        ),
        Box::new(
            EbookConvert::new()
                .with_binary(cfg.tools.ebook_convert.clone())
                .with_timeout(timeout),
        ),
        store,
        Box::new(
            MetadataApply::new(library.clone(), credentials, lang)
                .with_helper(cfg.tools.metadata_apply.clone())
                .with_timeout(timeout),
        ),
    );

    let job = AnalysisJob {
        book_id: args.book_id,
        library,
        format,
        lang,
        cache_dir: args.cache_dir.unwrap_or_else(|| cfg.cache_dir.clone()),
        analysis_json: args.analysis_json,
    };

    let outcome = pipeline.run(&job).await?;
    Report::compact(outcome)
}

/// Show the resolved configuration
fn show_config() -> Result<Report> {
    Report::pretty(config::config()?)
}
