//! Shared fixtures for the registry integration tests
//!
//! Bundles are written as real `.tar.gz` files; `GatedFetcher` serves them
//! from disk but can hold every download until the test opens the gate.

#![allow(dead_code)]

use async_trait::async_trait;
use docshelf_core::error::{DocsetError, Result};
use docshelf_core::feed::ByteProgress;
use docshelf_core::{Fetcher, Registry};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tar::{Builder, Header};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Contents of a test bundle
#[derive(Debug, Clone)]
pub struct BundleFixture {
    pub title: Option<String>,
    pub keywords: Vec<String>,
    /// (name, type) pairs for `symbols.json`
    pub symbols: Vec<(String, String)>,
    /// Wrap everything in a single top-level directory
    pub wrapper: Option<String>,
    pub with_documents: bool,
    /// Extra pages under `Documents/`
    pub pages: usize,
    /// Dash layout: `Contents/Info.plist` and a SQLite index
    pub dash: bool,
}

impl BundleFixture {
    pub fn new(symbols: &[(&str, &str)]) -> Self {
        Self {
            title: None,
            keywords: Vec::new(),
            symbols: symbols
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            wrapper: None,
            with_documents: true,
            pages: 0,
            dash: false,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn wrapped(mut self, dir: &str) -> Self {
        self.wrapper = Some(dir.to_string());
        self
    }

    pub fn without_documents(mut self) -> Self {
        self.with_documents = false;
        self
    }

    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    pub fn dash(mut self) -> Self {
        self.dash = true;
        self
    }

    fn symbol_path(name: &str) -> String {
        format!("{}.html", name.to_lowercase())
    }

    fn native_files(&self) -> Vec<(String, Vec<u8>)> {
        let symbols: Vec<serde_json::Value> = self
            .symbols
            .iter()
            .map(|(name, kind)| {
                serde_json::json!({
                    "name": name,
                    "type": kind,
                    "path": Self::symbol_path(name),
                    "fragment": name,
                })
            })
            .collect();

        let mut files = vec![(
            "symbols.json".to_string(),
            serde_json::to_vec(&symbols).unwrap(),
        )];
        if self.title.is_some() || !self.keywords.is_empty() {
            let meta = serde_json::json!({
                "title": self.title,
                "extra": { "keywords": self.keywords },
            });
            files.push(("meta.json".to_string(), meta.to_string().into_bytes()));
        }
        files
    }

    fn dash_files(&self) -> Vec<(String, Vec<u8>)> {
        let mut plist = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\">\n<dict>\n");
        let mut property = |key: &str, value: &str| {
            plist.push_str(&format!("    <key>{key}</key>\n    <string>{value}</string>\n"));
        };
        if let Some(title) = &self.title {
            property("CFBundleName", title.as_str());
        }
        if let Some(keyword) = self.keywords.first() {
            property("DocSetPlatformFamily", keyword.as_str());
        }
        if let Some(keyword) = self.keywords.get(1) {
            property("DashDocSetKeyword", keyword.as_str());
        }
        plist.push_str("</dict>\n</plist>\n");

        let db = tempfile::NamedTempFile::new().unwrap();
        {
            let conn = rusqlite::Connection::open(db.path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE searchIndex(id INTEGER PRIMARY KEY, name TEXT, type TEXT, path TEXT);",
            )
            .unwrap();
            for (name, kind) in &self.symbols {
                conn.execute(
                    "INSERT INTO searchIndex(name, type, path) VALUES (?1, ?2, ?3)",
                    rusqlite::params![name, kind, format!("{}#{name}", Self::symbol_path(name))],
                )
                .unwrap();
            }
        }

        vec![
            ("Contents/Info.plist".to_string(), plist.into_bytes()),
            (
                "Contents/Resources/docSet.dsidx".to_string(),
                std::fs::read(db.path()).unwrap(),
            ),
        ]
    }

    /// Write the bundle as `<dir>/<file_name>` and return its path
    pub fn write(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

        let (mut files, documents) = if self.dash {
            (self.dash_files(), "Contents/Resources/Documents")
        } else {
            (self.native_files(), "Documents")
        };
        if self.with_documents {
            files.push((
                format!("{documents}/index.html"),
                b"<html><body>docs</body></html>".to_vec(),
            ));
            for page in 0..self.pages {
                files.push((
                    format!("{documents}/page-{page}.html"),
                    format!("<html><body>page {page}</body></html>").into_bytes(),
                ));
            }
        }

        for (name, contents) in files {
            let name = match &self.wrapper {
                Some(wrapper) => format!("{wrapper}/{name}"),
                None => name,
            };
            let mut header = Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, &name, contents.as_slice())
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
        path
    }
}

/// Local transport with a gate that holds downloads mid-flight
pub struct GatedFetcher {
    feeds: Mutex<HashMap<String, String>>,
    gate: watch::Sender<bool>,
    /// Downloads currently held at the gate
    parked: watch::Sender<usize>,
    downloads: AtomicUsize,
    feed_fetches: AtomicUsize,
}

impl GatedFetcher {
    pub fn open() -> Arc<Self> {
        Self::with_gate(true)
    }

    pub fn closed() -> Arc<Self> {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Arc<Self> {
        let (gate, _) = watch::channel(open);
        let (parked, _) = watch::channel(0);
        Arc::new(Self {
            feeds: Mutex::new(HashMap::new()),
            gate,
            parked,
            downloads: AtomicUsize::new(0),
            feed_fetches: AtomicUsize::new(0),
        })
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn set_feed(&self, url: &str, document: &str) {
        self.feeds.lock().insert(url.to_string(), document.to_string());
    }

    /// Wait until a download is held at the closed gate
    pub async fn wait_started(&self) {
        let mut parked = self.parked.subscribe();
        parked.wait_for(|n| *n > 0).await.unwrap();
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn feed_fetches(&self) -> usize {
        self.feed_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.feed_fetches.fetch_add(1, Ordering::SeqCst);
        self.feeds
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| DocsetError::transport(url, "no such feed"))
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: ByteProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        progress(0, None);

        let mut gate = self.gate.subscribe();
        self.parked.send_modify(|n| *n += 1);
        let released = loop {
            if *gate.borrow_and_update() {
                break Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => break Err(DocsetError::cancelled(url)),
                changed = gate.changed() => {
                    if let Err(e) = changed {
                        break Err(DocsetError::transport(url, e));
                    }
                }
            }
        };
        self.parked.send_modify(|n| *n -= 1);
        released?;

        let bytes = std::fs::copy(url, dest).map_err(|e| DocsetError::transport(url, e))?;
        progress(bytes, Some(bytes));
        Ok(bytes)
    }
}

pub fn open_registry(root: &Path, fetcher: Arc<GatedFetcher>) -> Registry {
    init_test_logging();
    Registry::open(root, fetcher).unwrap()
}

/// Names of everything directly under `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
