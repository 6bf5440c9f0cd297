//! `calibredb` adapter for catalog reads and book exports.
//!
//! Subprocess mode only: every call spawns `calibredb` with the library
//! locator and credentials appended after the subcommand's own arguments.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::command::ToolCommand;
use super::{CatalogTool, ListQuery};
use crate::domain::{BookFormat, CatalogItem, Credentials, LibraryLocator};

/// calibredb adapter
pub struct CalibreDb {
    /// Program plus fixed leading arguments (default: `["calibredb"]`)
    binary: Vec<String>,

    library: LibraryLocator,

    credentials: Credentials,

    timeout: Option<Duration>,
}

impl CalibreDb {
    /// Create an adapter using `calibredb` from `PATH`
    pub fn new(library: LibraryLocator, credentials: Credentials) -> Self {
        Self {
            binary: vec!["calibredb".to_string()],
            library,
            credentials,
            timeout: None,
        }
    }

    /// Use a custom binary (or wrapper command)
    pub fn with_binary(mut self, binary: Vec<String>) -> Self {
        if !binary.is_empty() {
            self.binary = binary;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `--with-library` plus credentials
    fn global_args(&self) -> Vec<String> {
        let mut args = vec!["--with-library".to_string(), self.library.to_string()];
        args.extend(self.credentials.calibredb_args());
        args
    }

    /// Build the `list --for-machine` invocation
    pub fn list_command(&self, query: &ListQuery) -> ToolCommand {
        let mut cmd = ToolCommand::new("calibredb", &self.binary)
            .args(["list", "--for-machine", "--fields"])
            .arg(query.fields.as_str());

        if let Some(search) = &query.search {
            cmd = cmd.arg("--search").arg(search.as_str());
        }

        cmd.arg("--limit")
            .arg(query.limit.to_string())
            .args(self.global_args())
            .timeout(self.timeout)
    }

    /// Build the single-format export invocation
    pub fn export_command(&self, book_id: u64, format: &BookFormat, dest_dir: &Path) -> ToolCommand {
        ToolCommand::new("calibredb", &self.binary)
            .args(["export".to_string(), book_id.to_string()])
            .arg("--to-dir")
            .arg(dest_dir.to_string_lossy().to_string())
            .args([
                "--single-dir",
                "--formats",
                format.as_str(),
                "--dont-write-opf",
                "--dont-save-cover",
                "--dont-save-extra-files",
                "--replace-whitespace",
            ])
            .args(self.global_args())
            .timeout(self.timeout)
    }
}

/// Parse `calibredb list --for-machine` output
pub fn parse_rows(stdout: &str) -> Result<Vec<CatalogItem>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(stdout).context("Failed to parse calibredb JSON output")
}

#[async_trait]
impl CatalogTool for CalibreDb {
    fn name(&self) -> &str {
        "calibredb"
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<CatalogItem>> {
        let stdout = self.list_command(query).run().await?;
        parse_rows(&stdout)
    }

    async fn export(&self, book_id: u64, format: &BookFormat, dest_dir: &Path) -> Result<()> {
        self.export_command(book_id, format, dest_dir)
            .run()
            .await
            .with_context(|| format!("Failed to export book {} as {}", book_id, format))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> CalibreDb {
        CalibreDb::new(
            LibraryLocator::new("http://localhost:8080/#Books"),
            Credentials::new(Some("reader".to_string()), "CALIBRE_LENS_TEST_NO_SUCH_VAR"),
        )
    }

    #[test]
    fn test_list_command_shape() {
        let query = ListQuery::new("id,title", 100).with_search("tag:scifi");
        let cmd = adapter().list_command(&query);
        assert_eq!(
            cmd.argv(),
            [
                "calibredb",
                "list",
                "--for-machine",
                "--fields",
                "id,title",
                "--search",
                "tag:scifi",
                "--limit",
                "100",
                "--with-library",
                "http://localhost:8080/#Books",
                "--username",
                "reader",
            ]
        );
    }

    #[test]
    fn test_export_command_shape() {
        let cmd = adapter().export_command(42, &BookFormat::new("epub"), Path::new("/tmp/42"));
        let argv = cmd.argv();
        assert_eq!(&argv[..3], ["calibredb", "export", "42"]);
        assert!(argv.windows(2).any(|w| w == ["--to-dir", "/tmp/42"]));
        assert!(argv.windows(2).any(|w| w == ["--formats", "EPUB"]));
        assert!(argv.contains(&"--dont-write-opf".to_string()));
        assert!(argv.contains(&"--replace-whitespace".to_string()));
    }

    #[test]
    fn test_custom_binary() {
        let cmd = adapter()
            .with_binary(vec!["flatpak".to_string(), "run".to_string(), "calibredb".to_string()])
            .list_command(&ListQuery::new("id", 1));
        assert_eq!(&cmd.argv()[..4], ["flatpak", "run", "calibredb", "list"]);
    }

    #[test]
    fn test_parse_rows() {
        assert!(parse_rows("  \n").unwrap().is_empty());

        let rows = parse_rows(r#"[{"id": 1, "title": "A"}, {"id": 2, "title": "B"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].title.as_deref(), Some("B"));

        assert!(parse_rows("not json").is_err());
    }
}
