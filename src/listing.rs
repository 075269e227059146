// src/listing.rs
use serde::{Deserialize, Serialize};

/// One monitored platform within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Avito,
    Cian,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Avito => "avito",
            SourceKind::Cian => "cian",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ad extracted from a source page, already reduced to the
/// attributes the filter engine understands. Transient: lives from fetch
/// to notification, only its (source, source_id) pair is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub source: SourceKind,
    /// Source-native identifier, unique within a source.
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price in whole rubles; None when the ad hides it.
    #[serde(default)]
    pub price: Option<u64>,
    /// Area in square meters.
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    pub url: String,
    /// Source-reported publication time, unix seconds.
    #[serde(default)]
    pub published_at: Option<u64>,
}

impl Listing {
    /// Clean up source text before filtering: both sites embed markup and
    /// entity-escaped fragments in titles and snippets.
    pub fn normalize(&mut self) {
        self.title = normalize_text(&self.title);
        if let Some(d) = self.description.take() {
            let d = normalize_text(&d);
            self.description = (!d.is_empty()).then_some(d);
        }
        if let Some(l) = self.location.take() {
            let l = normalize_text(&l);
            self.location = (!l.is_empty()).then_some(l);
        }
    }
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace (includes NBSP the sites love)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 4) Length cap: 1000 chars
    if out.chars().count() > 1000 {
        out = out.chars().take(1000).collect();
    }

    out
}
