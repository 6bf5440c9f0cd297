//! JSON reports written to stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use crate::domain::{CacheRecord, CatalogItem};

/// A command's stdout report
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Indented, for humans reading catalog output
    Pretty(Value),

    /// Single line, for scripts consuming pipeline output
    Compact(Value),
}

impl Report {
    pub fn pretty(value: impl Serialize) -> Result<Self> {
        Ok(Self::Pretty(to_value(value)?))
    }

    pub fn compact(value: impl Serialize) -> Result<Self> {
        Ok(Self::Compact(to_value(value)?))
    }

    /// Failure report printed by the binary
    pub fn failure(error: &anyhow::Error) -> Self {
        Self::Pretty(serde_json::json!({
            "ok": false,
            "error": format!("{:#}", error),
        }))
    }

    pub fn value(&self) -> &Value {
        match self {
            Self::Pretty(v) | Self::Compact(v) => v,
        }
    }

    pub fn render(&self) -> String {
        let rendered = match self {
            Self::Pretty(v) => serde_json::to_string_pretty(v),
            Self::Compact(v) => serde_json::to_string(v),
        };
        // Values are already `serde_json::Value`s; serializing them cannot fail
        rendered.unwrap_or_else(|_| String::from("{\"ok\":false}"))
    }
}

fn to_value(value: impl Serialize) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize report")
}

#[derive(Debug, Serialize)]
pub struct ListReport {
    pub ok: bool,
    pub mode: &'static str,
    pub fields: String,
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Serialize)]
pub struct SearchReport {
    pub ok: bool,
    pub mode: &'static str,
    pub query: String,
    pub fields: String,
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Serialize)]
pub struct IdReport {
    pub ok: bool,
    pub mode: &'static str,
    pub book_id: u64,
    pub item: Option<CatalogItem>,
}

impl ListReport {
    pub fn new(fields: String, items: Vec<CatalogItem>) -> Self {
        Self {
            ok: true,
            mode: "list",
            fields,
            items,
        }
    }
}

impl SearchReport {
    pub fn new(query: String, fields: String, items: Vec<CatalogItem>) -> Self {
        Self {
            ok: true,
            mode: "search",
            query,
            fields,
            items,
        }
    }
}

impl IdReport {
    pub fn new(book_id: u64, item: Option<CatalogItem>) -> Self {
        Self {
            ok: true,
            mode: "id",
            book_id,
            item,
        }
    }
}

/// Reply of `cache status`
#[derive(Debug, Serialize)]
pub struct CacheStatusReport {
    pub ok: bool,
    pub book_id: u64,
    pub format: String,
    pub status: Option<CacheRecord>,
}

/// Reply of `cache upsert`
#[derive(Debug, Serialize)]
pub struct CacheUpsertReport {
    pub ok: bool,
    pub book_id: u64,
    pub format: String,
    pub upserted: bool,
}
