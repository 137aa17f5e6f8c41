//! User settings
//!
//! Settings live in `settings.yaml` under the platform config directory and
//! hold the storage root, the configured feeds and search defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.yaml";

const DEFAULT_SEARCH_LIMIT: usize = 100;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "docshelf", "docshelf")
}

/// A configured feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding installed `<identifier>.docset` bundles
    pub storage_root: PathBuf,
    pub feeds: Vec<FeedSource>,
    /// Experimental fuzzy matching as the default search mode
    pub fuzzy_search: bool,
    pub search_limit: usize,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            feeds: Vec::new(),
            fuzzy_search: false,
            search_limit: DEFAULT_SEARCH_LIMIT,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn default_storage_root() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("docsets"))
        .or_else(|| dirs::data_dir().map(|d| d.join("docshelf").join("docsets")))
        .unwrap_or_else(|| PathBuf::from("docsets"))
}

/// Settings bound to the file they were loaded from
pub struct Config {
    settings: Settings,
    config_path: PathBuf,
}

impl Config {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(config_path)
    }

    /// Load settings from a specific path; a missing file yields defaults
    pub fn load_from_path(config_path: PathBuf) -> Result<Self> {
        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read settings: {}", config_path.display())
            })?;
            serde_yaml_ng::from_str(&content).with_context(|| {
                format!("Failed to parse settings: {}", config_path.display())
            })?
        } else {
            Settings::default()
        };

        tracing::debug!("Loaded settings from {}", config_path.display());
        Ok(Self {
            settings,
            config_path,
        })
    }

    fn default_config_path() -> Result<PathBuf> {
        let config_dir = project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| dirs::config_dir().map(|d| d.join("docshelf")))
            .context("Could not determine config directory")?;
        Ok(config_dir.join(SETTINGS_FILE))
    }

    pub fn save(&self) -> Result<()> {
        let content =
            serde_yaml_ng::to_string(&self.settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write settings: {}", self.config_path.display())
        })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.settings.feeds
    }

    pub fn get_feed(&self, name: &str) -> Option<&FeedSource> {
        self.settings.feeds.iter().find(|f| f.name == name)
    }

    /// The feed marked default, or the first one
    pub fn default_feed(&self) -> Option<&FeedSource> {
        self.settings
            .feeds
            .iter()
            .find(|f| f.is_default)
            .or_else(|| self.settings.feeds.first())
    }

    /// Add a feed; the first feed added becomes the default
    ///
    /// `dash-feed://` links are stored as the URL they wrap.
    pub fn add_feed(&mut self, name: &str, url: &str) -> Result<()> {
        let url = crate::feed::normalize_feed_url(url);
        let url = url.as_str();
        if name.trim().is_empty() {
            anyhow::bail!("Feed name must not be empty");
        }
        if self.get_feed(name).is_some() {
            anyhow::bail!("Feed '{}' already exists", name);
        }

        let remote = url.starts_with("http://") || url.starts_with("https://");
        let local = url.starts_with("file://") || Path::new(url).exists();
        if !remote && !local {
            anyhow::bail!("Feed URL must be http(s)://, file:// or an existing path");
        }

        let is_default = self.settings.feeds.is_empty();
        self.settings.feeds.push(FeedSource {
            name: name.to_string(),
            url: url.to_string(),
            is_default,
        });
        Ok(())
    }

    pub fn remove_feed(&mut self, name: &str) -> Result<()> {
        let initial_len = self.settings.feeds.len();
        self.settings.feeds.retain(|f| f.name != name);

        if self.settings.feeds.len() == initial_len {
            anyhow::bail!("Feed '{}' not found", name);
        }

        if !self.settings.feeds.iter().any(|f| f.is_default) {
            if let Some(first) = self.settings.feeds.first_mut() {
                first.is_default = true;
            }
        }
        Ok(())
    }

    pub fn set_default_feed(&mut self, name: &str) -> Result<()> {
        if self.get_feed(name).is_none() {
            anyhow::bail!("Feed '{}' not found", name);
        }
        for feed in &mut self.settings.feeds {
            feed.is_default = feed.name == name;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_path(dir.path().join(SETTINGS_FILE)).unwrap();
        let settings = config.settings();
        assert!(!settings.fuzzy_search);
        assert_eq!(settings.search_limit, 100);
        assert_eq!(settings.http_timeout(), Duration::from_secs(60));
        assert!(config.default_feed().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "storage_root: /srv/docsets\nfuzzy_search: true\n").unwrap();

        let config = Config::load_from_path(path).unwrap();
        assert_eq!(config.settings().storage_root, PathBuf::from("/srv/docsets"));
        assert!(config.settings().fuzzy_search);
        assert_eq!(config.settings().search_limit, 100);
    }

    #[test]
    fn test_feed_management_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let mut config = Config::load_from_path(path.clone()).unwrap();
        config.add_feed("main", "https://example.com/feed.json").unwrap();
        config.add_feed("mirror", "https://mirror.example.com/feed.json").unwrap();
        assert!(config.add_feed("main", "https://other.example.com").is_err());
        assert!(config.add_feed("bad", "ftp://example.com/feed").is_err());
        config
            .add_feed("dash", "dash-feed://https%3A%2F%2Fexample.com%2FRust.xml")
            .unwrap();
        assert_eq!(config.get_feed("dash").unwrap().url, "https://example.com/Rust.xml");
        config.remove_feed("dash").unwrap();
        assert_eq!(config.default_feed().unwrap().name, "main");

        config.set_default_feed("mirror").unwrap();
        config.save().unwrap();

        let mut reloaded = Config::load_from_path(path).unwrap();
        assert_eq!(reloaded.feeds().len(), 2);
        assert_eq!(reloaded.default_feed().unwrap().name, "mirror");

        reloaded.remove_feed("mirror").unwrap();
        assert_eq!(reloaded.default_feed().unwrap().name, "main");
        assert!(reloaded.default_feed().unwrap().is_default);
        assert!(reloaded.remove_feed("mirror").is_err());
    }
}
