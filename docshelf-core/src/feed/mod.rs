//! Docset feeds
//!
//! A feed lists the docsets available for installation. It is a JSON (or
//! YAML) document holding either a bare list of records or an object with a
//! `docsets` list:
//!
//! ```json
//! [
//!   { "identifier": "rust", "name": "Rust", "url": "https://.../rust.tgz", "revision": "4" }
//! ]
//! ```
//!
//! A Dash XML feed (`<entry><version/><url/>...</entry>`) is also accepted;
//! it describes a single docset named after the feed file.

pub mod dash;
pub mod fetcher;

pub use fetcher::{ByteProgress, Fetcher, HttpFetcher, Source};

use crate::error::{DocsetError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// One installable docset as described by a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// `sha256:<hex>` or bare hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Alternative download locations, tried in order after `url`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
    /// Feed this entry was read from; set by the client, not the document
    #[serde(skip)]
    pub feed_url: Option<String>,
}

impl FeedEntry {
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            url: url.into(),
            revision: revision.into(),
            version: None,
            digest: None,
            keywords: Vec::new(),
            mirrors: Vec::new(),
            feed_url: None,
        }
    }

    /// Synthesize an entry for a local archive
    ///
    /// The name is left empty so the bundle's own title is kept.
    pub fn from_archive(path: &Path, identifier: &str) -> Self {
        Self::new(identifier, "", path.display().to_string(), "")
    }

    /// `url` followed by the mirrors, without repeats
    pub fn download_urls(&self) -> impl Iterator<Item = &str> {
        let mut seen = HashSet::new();
        std::iter::once(&self.url)
            .chain(&self.mirrors)
            .map(String::as_str)
            .filter(move |url| !url.is_empty() && seen.insert(*url))
    }

    /// Lowercase hex SHA-256 the download must match, if the feed gave one
    pub fn expected_sha256(&self) -> Option<String> {
        self.digest.as_ref().map(|d| {
            d.trim()
                .strip_prefix("sha256:")
                .unwrap_or(d.trim())
                .to_ascii_lowercase()
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    List(Vec<FeedEntry>),
    Wrapped { docsets: Vec<FeedEntry> },
}

impl FeedDocument {
    fn into_entries(self) -> Vec<FeedEntry> {
        match self {
            FeedDocument::List(entries) => entries,
            FeedDocument::Wrapped { docsets } => docsets,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Revision {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Revision::deserialize(deserializer)? {
        Revision::Text(s) => s,
        Revision::Int(i) => i.to_string(),
        Revision::Float(f) => f.to_string(),
    })
}

/// An identifier must be usable as a single directory name
pub fn is_safe_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.starts_with('.')
        && !identifier
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control())
}

/// Parse a feed document
///
/// `source` names the feed in errors. Later records with an identifier that
/// was already seen are dropped.
pub fn parse_feed(source: &str, text: &str) -> Result<Vec<FeedEntry>> {
    if text.trim_start().starts_with('<') {
        return dash::parse_dash_feed(source, text).map(|entry| vec![entry]);
    }

    let document: FeedDocument = match serde_json::from_str(text) {
        Ok(document) => document,
        Err(json_err) => serde_yaml_ng::from_str(text)
            .map_err(|_| DocsetError::malformed_feed(source, json_err))?,
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for mut entry in document.into_entries() {
        entry.identifier = entry.identifier.trim().to_string();
        entry.url = entry.url.trim().to_string();
        entry.mirrors = entry
            .mirrors
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();

        if entry.identifier.is_empty() {
            return Err(DocsetError::malformed_feed(source, "entry without identifier"));
        }
        if entry.url.is_empty() {
            return Err(DocsetError::malformed_feed(
                source,
                format!("entry '{}' has no url", entry.identifier),
            ));
        }
        if !is_safe_identifier(&entry.identifier) {
            return Err(DocsetError::malformed_feed(
                source,
                format!("identifier '{}' is not a valid directory name", entry.identifier),
            ));
        }
        if !seen.insert(entry.identifier.clone()) {
            warn!(feed = source, identifier = %entry.identifier, "Dropping duplicate feed entry");
            continue;
        }
        if entry.name.is_empty() {
            entry.name = entry.identifier.clone();
        }
        entry.feed_url = Some(source.to_string());
        entries.push(entry);
    }

    debug!(feed = source, count = entries.len(), "Parsed feed");
    Ok(entries)
}

/// Resolve a `dash-feed://` link to the feed URL it wraps
///
/// Other URLs are returned unchanged.
pub fn normalize_feed_url(url: &str) -> String {
    match url.trim().strip_prefix(dash::LINK_SCHEME) {
        Some(encoded) => urlencoding::decode(encoded)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| encoded.to_string()),
        None => url.trim().to_string(),
    }
}

/// Fetch and parse a feed
pub async fn fetch_feed(fetcher: &dyn Fetcher, url: &str) -> Result<Vec<FeedEntry>> {
    let url = normalize_feed_url(url);
    let text = fetcher.fetch_text(&url).await?;
    parse_feed(&url, &text)
}
