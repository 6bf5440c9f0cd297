//! Lightweight analysis of extracted book text.
//!
//! The built-in analyser is deliberately shallow: a fixed per-language
//! summary and reread anchor, plus a keyword probe over the opening text.
//! A richer analysis can be supplied as JSON and is used verbatim.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

use crate::domain::{AnalysisCore, Lang, RereadAnchor};

/// Characters of normalized text the keyword probe looks at
pub const HEAD_CHARS: usize = 12_000;

/// Most highlights kept in a record
pub const MAX_HIGHLIGHTS: usize = 5;

/// Most keywords listed in the keyword highlight
const MAX_KEYWORDS: usize = 6;

/// Terms probed for in the opening text
const KEYWORDS: [&str; 8] = ["海賊", "歴史", "設計", "章", "目次", "Python", "AI", "データ"];

/// Drop blank lines and surrounding whitespace, keep line structure
pub fn normalize_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `HEAD_CHARS` characters (not bytes) of the normalized body
pub fn head(body: &str) -> &str {
    match body.char_indices().nth(HEAD_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Keywords present in `text`, in probe order
pub fn detect_keywords(text: &str) -> Vec<&'static str> {
    KEYWORDS.iter().copied().filter(|kw| text.contains(kw)).collect()
}

/// Derive summary, highlights and reread anchors from book text
pub fn analyze(text: &str, lang: Lang) -> AnalysisCore {
    let body = normalize_text(text);
    let opening = head(&body);

    let (summary, base_highlights, anchor, keyword_label) = match lang {
        Lang::Ja => (
            "本文冒頭を中心に要点を抽出した自動解析。必要箇所へ戻れる再読導線を付与。",
            vec![
                "主要トピックの把握に必要な語を抽出。",
                "後で読み返すための再読ガイドを保持。",
                "メタデータHTMLへ埋め込み可能な構造で保存。",
            ],
            ("冒頭", "文脈の再確認"),
            "検出キーワード: ",
        ),
        Lang::En => (
            "Auto analysis from opening sections with reread anchors.",
            vec![
                "Extract key terms from opening content.",
                "Store reread guidance.",
                "Persist structure for metadata HTML.",
            ],
            ("opening", "context refresh"),
            "Detected keywords: ",
        ),
    };

    let keywords = detect_keywords(opening);
    let keyword_line = (!keywords.is_empty()).then(|| {
        let listed: Vec<&str> = keywords.iter().copied().take(MAX_KEYWORDS).collect();
        format!("{}{}", keyword_label, listed.join(", "))
    });

    let mut highlights: Vec<String> = base_highlights.iter().map(|h| h.to_string()).collect();
    highlights.extend(keyword_line);
    highlights.truncate(MAX_HIGHLIGHTS);

    AnalysisCore {
        summary: summary.to_string(),
        highlights,
        reread: vec![RereadAnchor {
            section: anchor.0.to_string(),
            locator: "EPUB-loc".to_string(),
            chunk_id: "auto-intro".to_string(),
            reason: anchor.1.to_string(),
        }],
    }
}

/// Load a pre-computed analysis (`summary`, `highlights`, `reread`)
pub async fn load_analysis(path: &Path) -> Result<AnalysisCore> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read analysis JSON: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Invalid analysis JSON: {}", path.display()))
}
