//! Catalog-side types: rows returned by `calibredb`, the library locator
//! and the credentials used to reach it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Columns requested when the caller doesn't name any
pub const DEFAULT_FIELDS: &str =
    "id,title,authors,series,series_index,tags,formats,publisher,pubdate,languages,last_modified";

/// Default columns for single-book lookups (adds the description)
pub const DEFAULT_ID_FIELDS: &str =
    "id,title,authors,series,series_index,tags,formats,publisher,pubdate,languages,last_modified,comments";

/// Environment variable holding the content-server password by default
pub const DEFAULT_PASSWORD_ENV: &str = "CALIBRE_PASSWORD";

/// One row of `calibredb list --for-machine`.
///
/// Only the columns that were requested come back, so every field is
/// optional and absent ones are left out again on output. Columns we don't
/// model are kept in `extra` untouched, in the order calibredb sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_index: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CatalogItem {
    /// Minimal item, mostly useful for fakes and tests
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: Some(title.into()),
            authors: None,
            series: None,
            series_index: None,
            tags: None,
            formats: None,
            publisher: None,
            pubdate: None,
            languages: None,
            last_modified: None,
            comments: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Where the library lives: a local path or `http://HOST:PORT/#LIBRARY_ID`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryLocator(String);

impl LibraryLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Library id: the fragment after `#`, or the whole locator if there is none
    pub fn library_id(&self) -> &str {
        match self.0.split_once('#') {
            Some((_, id)) => id,
            None => &self.0,
        }
    }
}

impl fmt::Display for LibraryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-server credentials.
///
/// The password itself is never stored: only the name of the environment
/// variable it is read from, at the moment a command line is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_password_env() -> String {
    DEFAULT_PASSWORD_ENV.to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: None,
            password_env: default_password_env(),
        }
    }
}

impl Credentials {
    pub fn new(username: Option<String>, password_env: impl Into<String>) -> Self {
        Self {
            username: username.filter(|u| !u.is_empty()),
            password_env: password_env.into(),
        }
    }

    /// Password from the configured variable; unset and empty are the same
    pub fn password(&self) -> Option<String> {
        if self.password_env.is_empty() {
            return None;
        }
        std::env::var(&self.password_env)
            .ok()
            .filter(|p| !p.is_empty())
    }

    /// `--username`/`--password` arguments for calibredb
    pub fn calibredb_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(username) = &self.username {
            args.push("--username".to_string());
            args.push(username.clone());
        }
        if let Some(password) = self.password() {
            args.push("--password".to_string());
            args.push(password);
        }
        args
    }
}
