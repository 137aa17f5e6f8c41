//! Installed docsets: bundle metadata plus the symbol index
//!
//! Two bundle layouts are understood. A native bundle keeps `symbols.json`
//! and `Documents/` at its root; a Dash bundle keeps `Contents/Info.plist`
//! and a SQLite index next to `Contents/Resources/Documents/`.

pub mod dash;
pub mod fuzzy;
pub mod index;
pub mod symbol;

pub use index::DocsetIndex;
pub use symbol::{SymbolCategory, SymbolEntry};

use crate::error::{DocsetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const META_FILE: &str = "meta.json";
pub const SYMBOLS_FILE: &str = "symbols.json";
pub const CONTENT_DIR: &str = "Documents";
pub const DOCSET_EXTENSION: &str = "docset";

const ICON_FILES: [&str; 2] = ["icon.png", "icon@2x.png"];

/// `meta.json` as stored inside a bundle
///
/// Every field is optional in a downloaded bundle; the registry fills in the
/// identifier, name, revision and source URLs when it installs one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: BundleExtra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleExtra {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_java_script_enabled: Option<bool>,
}

impl BundleMeta {
    /// Read `meta.json` from a bundle root; a missing file yields defaults
    pub fn read(root: &Path) -> Result<Self> {
        let path = root.join(META_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            DocsetError::corrupt(root.display().to_string(), format!("cannot read {META_FILE}: {e}"))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            DocsetError::corrupt(root.display().to_string(), format!("invalid {META_FILE}: {e}"))
        })
    }

    pub fn write(&self, root: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            DocsetError::corrupt(root.display().to_string(), format!("cannot serialize {META_FILE}: {e}"))
        })?;
        std::fs::write(root.join(META_FILE), text).map_err(|e| {
            DocsetError::extraction(root.display().to_string(), format!("cannot write {META_FILE}: {e}"))
        })
    }
}

/// How a bundle stores its index and content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleLayout {
    #[default]
    Native,
    Dash,
}

impl BundleLayout {
    /// A bundle with a Dash SQLite index is a Dash bundle
    pub fn detect(root: &Path) -> Self {
        if dash::index_path(root).is_file() {
            BundleLayout::Dash
        } else {
            BundleLayout::Native
        }
    }

    pub fn content_dir(self, root: &Path) -> PathBuf {
        match self {
            BundleLayout::Native => root.join(CONTENT_DIR),
            BundleLayout::Dash => dash::resources_dir(root).join(CONTENT_DIR),
        }
    }
}

/// What the registry knows about an installed docset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocsetMetadata {
    pub identifier: String,
    pub name: String,
    pub revision: String,
    pub version: Option<String>,
    /// Icon file name relative to `path`
    pub icon: Option<String>,
    pub path: PathBuf,
    pub keywords: Vec<String>,
    pub feed_url: Option<String>,
    pub download_url: Option<String>,
    /// Every recorded download location, `download_url` first
    pub urls: Vec<String>,
    pub layout: BundleLayout,
    pub installed_at: Option<DateTime<Utc>>,
}

impl DocsetMetadata {
    pub fn icon_path(&self) -> Option<PathBuf> {
        self.icon.as_ref().map(|icon| self.path.join(icon))
    }

    pub fn content_path(&self) -> PathBuf {
        self.layout.content_dir(&self.path)
    }
}

/// A loaded docset: metadata plus its exclusively owned index
#[derive(Debug)]
pub struct Docset {
    metadata: DocsetMetadata,
    index: DocsetIndex,
}

impl Docset {
    pub fn new(metadata: DocsetMetadata, index: DocsetIndex) -> Self {
        Self { metadata, index }
    }

    /// Load an installed `<identifier>.docset` directory
    pub fn open(path: &Path) -> Result<Self> {
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let meta = BundleMeta::read(path)?;
        Self::load(path, path, &meta, &fallback)
    }

    /// Build a docset from the bundle at `root`, recording `final_path` as its
    /// storage location
    ///
    /// `fallback_id` is used when `meta.json` carries no name.
    pub fn load(root: &Path, final_path: &Path, meta: &BundleMeta, fallback_id: &str) -> Result<Self> {
        let identifier = meta
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_id.to_string());

        let layout = BundleLayout::detect(root);
        if !layout.content_dir(root).is_dir() {
            return Err(DocsetError::corrupt(
                identifier,
                format!("missing {CONTENT_DIR}/ content store"),
            ));
        }

        let (index, plist) = match layout {
            BundleLayout::Native => (
                DocsetIndex::from_file(&identifier, &root.join(SYMBOLS_FILE))?,
                dash::InfoPlist::default(),
            ),
            BundleLayout::Dash => (
                dash::read_index(&identifier, root)?,
                dash::InfoPlist::read(&identifier, root)?,
            ),
        };

        let name = meta
            .title
            .clone()
            .or(plist.bundle_name)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| identifier.replace('_', " "));
        let keywords = if meta.extra.keywords.is_empty() {
            plist.keywords
        } else {
            meta.extra.keywords.clone()
        };

        let icon = ICON_FILES
            .iter()
            .find(|icon| root.join(icon).is_file())
            .map(|icon| icon.to_string());

        let metadata = DocsetMetadata {
            identifier,
            name,
            revision: meta.revision.clone().unwrap_or_default(),
            version: meta.version.clone(),
            icon,
            path: final_path.to_path_buf(),
            keywords,
            feed_url: meta.feed_url.clone(),
            download_url: meta.urls.first().cloned(),
            urls: meta.urls.clone(),
            layout,
            installed_at: meta.installed_at,
        };

        Ok(Self { metadata, index })
    }

    pub fn metadata(&self) -> &DocsetMetadata {
        &self.metadata
    }

    pub fn index(&self) -> &DocsetIndex {
        &self.index
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Case-insensitive prefix match against the keywords and identifier
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        std::iter::once(&self.metadata.identifier)
            .chain(self.metadata.keywords.iter())
            .any(|k| k.to_lowercase().starts_with(&keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_bundle(root: &Path, meta: Option<&str>) {
        fs::create_dir_all(root.join(CONTENT_DIR)).unwrap();
        fs::write(root.join(CONTENT_DIR).join("index.html"), "<html></html>").unwrap();
        fs::write(
            root.join(SYMBOLS_FILE),
            r#"[{"name": "len", "type": "Method", "path": "str.html", "fragment": "len"}]"#,
        )
        .unwrap();
        if let Some(meta) = meta {
            fs::write(root.join(META_FILE), meta).unwrap();
        }
    }

    #[test]
    fn test_open_reads_meta_json() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("rust.docset");
        write_bundle(
            &root,
            Some(
                r#"{
                    "name": "rust",
                    "title": "Rust",
                    "version": "1.80.0",
                    "revision": "3",
                    "feed_url": "https://example.com/feed.json",
                    "urls": ["https://example.com/rust.tgz"],
                    "extra": {"keywords": ["rs", "rust"], "indexFilePath": "std/index.html"}
                }"#,
            ),
        );
        fs::write(root.join("icon.png"), b"png").unwrap();

        let docset = Docset::open(&root).unwrap();
        let meta = docset.metadata();
        assert_eq!(meta.identifier, "rust");
        assert_eq!(meta.name, "Rust");
        assert_eq!(meta.revision, "3");
        assert_eq!(meta.version.as_deref(), Some("1.80.0"));
        assert_eq!(meta.download_url.as_deref(), Some("https://example.com/rust.tgz"));
        assert_eq!(meta.icon_path(), Some(root.join("icon.png")));
        assert_eq!(docset.index().len(), 1);
        assert!(docset.matches_keyword("RS"));
        assert!(!docset.matches_keyword("python"));
    }

    #[test]
    fn test_open_without_meta_uses_directory_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Ruby_on_Rails.docset");
        write_bundle(&root, None);

        let docset = Docset::open(&root).unwrap();
        assert_eq!(docset.identifier(), "Ruby_on_Rails");
        assert_eq!(docset.name(), "Ruby on Rails");
        assert_eq!(docset.metadata().revision, "");
        assert_eq!(docset.metadata().icon, None);
    }

    #[test]
    fn test_missing_content_store_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("broken.docset");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(SYMBOLS_FILE), "[]").unwrap();

        let err = Docset::open(&root).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CorruptDocset);
        assert_eq!(err.target, "broken");
    }

    #[test]
    fn test_open_dash_bundle() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Bash.docset");
        dash::tests::write_dash_bundle(&root);

        let docset = Docset::open(&root).unwrap();
        let meta = docset.metadata();
        assert_eq!(meta.layout, BundleLayout::Dash);
        assert_eq!(meta.identifier, "Bash");
        assert_eq!(meta.name, "GNU Bash");
        assert_eq!(meta.keywords, vec!["bash".to_string()]);
        assert_eq!(
            meta.content_path(),
            root.join("Contents").join("Resources").join("Documents")
        );
        assert_eq!(docset.index().len(), 2);

        // meta.json wins over Info.plist
        fs::write(
            root.join(META_FILE),
            r#"{"title": "Bash 5", "extra": {"keywords": ["sh"]}}"#,
        )
        .unwrap();
        let docset = Docset::open(&root).unwrap();
        assert_eq!(docset.name(), "Bash 5");
        assert_eq!(docset.metadata().keywords, vec!["sh".to_string()]);
    }

    #[test]
    fn test_bundle_meta_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let meta = BundleMeta {
            name: Some("go".to_string()),
            revision: Some("7".to_string()),
            urls: vec!["file:///tmp/go.tgz".to_string()],
            ..Default::default()
        };
        meta.write(dir.path()).unwrap();
        assert_eq!(BundleMeta::read(dir.path()).unwrap(), meta);
    }
}
