//! Docset registry
//!
//! The registry owns the storage root and the committed catalog. It runs
//! install and update jobs as Tokio tasks, one per identifier at most, and
//! publishes a new catalog snapshot when a job activates its docset.
//!
//! On disk every installed docset lives in `<root>/<identifier>.docset/`.
//! Jobs work inside a private `<root>/.docshelf-<identifier>-XXXX/`
//! directory so the final rename never crosses a filesystem; the directory
//! is removed when the job ends, whatever the outcome. A docset that is
//! already installed keeps its directory, whatever its name.

pub mod job;
pub mod state;
pub mod storage;

pub use job::{InstallJob, JobKind, JobPhase, JobProgress};
pub use state::{Activity, DocsetState};
pub use storage::{LocalStorage, StorageBackend};

use crate::archive;
use crate::catalog::{Catalog, SharedCatalog};
use crate::config::Settings;
use crate::docset::{BundleMeta, Docset, DocsetMetadata, DOCSET_EXTENSION};
use crate::error::{DocsetError, ErrorKind, Result};
use crate::feed::{self, is_safe_identifier, ByteProgress, FeedEntry, Fetcher, HttpFetcher};
use crate::search::SearchEngine;
use chrono::Utc;
use parking_lot::Mutex;
use state::Slot;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub(crate) const WORKSPACE_PREFIX: &str = ".docshelf-";
const ARCHIVE_FILE: &str = "archive.tar.gz";
const STAGING_DIR: &str = "staging";
const PREVIOUS_DIR: &str = "previous";
const REMOVED_DIR: &str = "removed";

/// Handle to a docset registry; clones share the same registry
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.inner.root)
            .field("docsets", &self.inner.catalog.load().len())
            .field("jobs", &self.active_jobs().len())
            .finish()
    }
}

struct Inner {
    root: PathBuf,
    catalog: SharedCatalog,
    /// Uncommitted state per identifier; never held across an await
    slots: Mutex<HashMap<String, Slot>>,
    /// Serializes catalog mutation and the renames that go with it
    writer: Mutex<()>,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn StorageBackend>,
}

impl Registry {
    /// Open the registry at `root` using the local filesystem
    pub fn open(root: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Self::open_with_storage(root, fetcher, Arc::new(LocalStorage))
    }

    /// Open the registry configured by `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetcher = HttpFetcher::new(settings.http_timeout())?;
        Self::open(settings.storage_root.clone(), Arc::new(fetcher))
    }

    /// Open the registry at `root`, loading every `*.docset` directory
    ///
    /// Directories that fail to load are skipped with a warning. Workspaces
    /// left behind by an interrupted process are deleted when the root is
    /// writable.
    pub fn open_with_storage(
        root: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DocsetError::storage_unavailable(
                &root,
                "does not exist or is not a directory",
            ));
        }
        let writable = storage.check_root(&root).is_ok();

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&root)
            .map_err(|e| DocsetError::storage_unavailable(&root, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        paths.sort();

        let mut docsets = Vec::new();
        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if file_name.starts_with(WORKSPACE_PREFIX) {
                if writable {
                    match storage.remove_dir_all(&path) {
                        Ok(()) => warn!("Removed stale workspace {}", path.display()),
                        Err(e) => warn!("Failed to remove stale workspace {}: {}", path.display(), e),
                    }
                }
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) != Some(DOCSET_EXTENSION) {
                continue;
            }

            match Docset::open(&path) {
                Ok(docset) => {
                    debug!(
                        "Loaded docset {} ({} symbols)",
                        docset.identifier(),
                        docset.index().len()
                    );
                    docsets.push(docset);
                }
                Err(e) => warn!("Skipping docset {}: {}", path.display(), e),
            }
        }

        let catalog: Catalog = docsets.into_iter().collect();
        info!("Loaded {} docsets from {}", catalog.len(), root.display());

        Ok(Self {
            inner: Arc::new(Inner {
                root,
                catalog: catalog.shared(),
                slots: Mutex::new(HashMap::new()),
                writer: Mutex::new(()),
                fetcher,
                storage,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// The current committed catalog snapshot
    pub fn catalog(&self) -> Arc<Catalog> {
        self.inner.catalog.load_full()
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<Docset>> {
        self.inner.catalog.load().get(identifier).cloned()
    }

    /// Fetch a feed with the registry's transport
    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>> {
        feed::fetch_feed(self.inner.fetcher.as_ref(), url).await
    }

    /// Start installing `entry`
    ///
    /// Returns the existing handle when a job for the identifier is already
    /// running. An installed identifier is replaced once the new docset is
    /// fully indexed. Must be called from within a Tokio runtime.
    pub fn install(&self, entry: FeedEntry) -> Result<InstallJob> {
        let kind = if self.inner.catalog.load().contains(&entry.identifier) {
            JobKind::Update
        } else {
            JobKind::Install
        };
        self.start(entry, kind)
    }

    /// Install from a local `.tar.gz` bundle
    pub fn install_archive(&self, path: &Path, identifier: &str) -> Result<InstallJob> {
        self.install(FeedEntry::from_archive(path, identifier))
    }

    /// Re-install `identifier` from the feed it came from
    ///
    /// Falls back to the recorded download URL when no feed was recorded.
    /// The installed docset stays searchable until the new one is activated.
    pub async fn update(&self, identifier: &str) -> Result<InstallJob> {
        self.inner
            .storage
            .check_root(&self.inner.root)
            .map_err(|e| e.for_docset(identifier))?;

        if let Some(job) = self.active_job(identifier) {
            return Ok(job);
        }

        let docset = self
            .get(identifier)
            .ok_or_else(|| DocsetError::not_found(identifier))?;
        let meta = docset.metadata();

        let entry = match (&meta.feed_url, &meta.download_url) {
            (Some(feed_url), _) => self
                .fetch_feed(feed_url)
                .await
                .map_err(|e| e.for_docset(identifier))?
                .into_iter()
                .find(|e| e.identifier == identifier)
                .ok_or_else(|| {
                    DocsetError::new(
                        ErrorKind::NotFound,
                        identifier,
                        format!("not listed in feed {feed_url}"),
                    )
                })?,
            (None, Some(url)) => {
                let mut entry =
                    FeedEntry::new(identifier, meta.name.clone(), url.clone(), meta.revision.clone());
                entry.mirrors = meta.urls.iter().filter(|u| *u != url).cloned().collect();
                entry
            }
            (None, None) => {
                return Err(DocsetError::new(
                    ErrorKind::NotFound,
                    identifier,
                    "no feed or download URL recorded",
                ))
            }
        };

        self.start(entry, JobKind::Update)
    }

    fn start(&self, entry: FeedEntry, kind: JobKind) -> Result<InstallJob> {
        let identifier = entry.identifier.clone();
        if !is_safe_identifier(&identifier) {
            return Err(DocsetError::malformed_feed(
                &identifier,
                "identifier is not a valid directory name",
            ));
        }
        self.inner
            .storage
            .check_root(&self.inner.root)
            .map_err(|e| e.for_docset(&identifier))?;

        let job = {
            let mut slots = self.inner.slots.lock();
            match slots.get(&identifier) {
                Some(Slot::Job(job)) if !job.is_finished() => {
                    debug!("{}: joining running job", identifier);
                    return Ok(job.clone());
                }
                Some(Slot::Removing) => return Err(DocsetError::busy(&identifier)),
                _ => {}
            }
            let job = InstallJob::new(&identifier, kind);
            slots.insert(identifier.clone(), Slot::Job(job.clone()));
            job
        };

        info!("{:?} of {} from {} started", kind, identifier, entry.url);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.run(entry, job.clone()));
        Ok(job)
    }

    /// Remove an installed docset
    ///
    /// The directory is moved out of place first; if that fails the docset
    /// stays installed and the call can simply be retried.
    pub fn remove(&self, identifier: &str) -> Result<()> {
        let previous = {
            let mut slots = self.inner.slots.lock();
            if slots.get(identifier).is_some_and(Slot::is_busy) {
                return Err(DocsetError::busy(identifier));
            }
            if !self.inner.catalog.load().contains(identifier) {
                return Err(DocsetError::not_found(identifier));
            }
            slots.insert(identifier.to_string(), Slot::Removing)
        };

        let result = self.inner.remove_committed(identifier);

        let mut slots = self.inner.slots.lock();
        match (&result, previous) {
            (Err(_), Some(slot)) => {
                slots.insert(identifier.to_string(), slot);
            }
            _ => {
                slots.remove(identifier);
            }
        }
        result
    }

    /// Remove several docsets, reporting each outcome
    pub fn remove_all<S: AsRef<str>>(&self, identifiers: &[S]) -> Vec<(String, Result<()>)> {
        identifiers
            .iter()
            .map(|id| (id.as_ref().to_string(), self.remove(id.as_ref())))
            .collect()
    }

    /// Committed docsets, sorted by display name
    pub fn list_installed(&self) -> Vec<DocsetMetadata> {
        self.inner.catalog.load().metadata()
    }

    /// Feed entries that are not installed
    pub fn list_available(&self, feed: &[FeedEntry]) -> Vec<FeedEntry> {
        let catalog = self.inner.catalog.load();
        feed.iter()
            .filter(|e| !catalog.contains(&e.identifier))
            .cloned()
            .collect()
    }

    /// Feed entries whose revision differs from the installed one
    pub fn updates_available(&self, feed: &[FeedEntry]) -> Vec<FeedEntry> {
        let catalog = self.inner.catalog.load();
        feed.iter()
            .filter(|e| {
                catalog
                    .get(&e.identifier)
                    .is_some_and(|d| d.metadata().revision != e.revision)
            })
            .cloned()
            .collect()
    }

    pub fn state(&self, identifier: &str) -> DocsetState {
        if let Some(slot) = self.inner.slots.lock().get(identifier) {
            return slot.state();
        }
        if self.inner.catalog.load().contains(identifier) {
            DocsetState::Installed
        } else {
            DocsetState::NotInstalled
        }
    }

    pub fn active_job(&self, identifier: &str) -> Option<InstallJob> {
        match self.inner.slots.lock().get(identifier) {
            Some(Slot::Job(job)) if !job.is_finished() => Some(job.clone()),
            _ => None,
        }
    }

    /// Running jobs, by identifier
    pub fn active_jobs(&self) -> Vec<InstallJob> {
        let mut jobs: Vec<InstallJob> = self
            .inner
            .slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Job(job) if !job.is_finished() => Some(job.clone()),
                _ => None,
            })
            .collect();
        jobs.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        jobs
    }

    pub fn activity(&self) -> Activity {
        Activity::from_jobs(&self.active_jobs())
    }

    /// Clear a failure, returning the identifier to its committed state
    pub fn dismiss(&self, identifier: &str) -> DocsetState {
        {
            let mut slots = self.inner.slots.lock();
            if matches!(slots.get(identifier), Some(Slot::Failed(_))) {
                slots.remove(identifier);
            }
        }
        self.state(identifier)
    }

    pub fn search_engine(&self) -> SearchEngine {
        SearchEngine::new(Arc::clone(&self.inner.catalog))
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocsetError::extraction("worker", format!("background task failed: {e}")))?
}

fn check_cancel(job: &InstallJob) -> Result<()> {
    if job.is_cancelled() {
        return Err(DocsetError::cancelled(job.identifier()));
    }
    Ok(())
}

/// Merge the feed entry into the extracted bundle and load it
fn prepare_bundle(staging: &Path, final_path: &Path, entry: &FeedEntry) -> Result<(PathBuf, Docset)> {
    let root = archive::locate_bundle_root(staging)?;
    let mut meta = BundleMeta::read(&root)?;

    meta.name = Some(entry.identifier.clone());
    if !entry.name.is_empty() {
        meta.title = Some(entry.name.clone());
    }
    if !entry.revision.is_empty() {
        meta.revision = Some(entry.revision.clone());
    }
    if entry.version.is_some() {
        meta.version = entry.version.clone();
    }
    if entry.feed_url.is_some() {
        meta.feed_url = entry.feed_url.clone();
    }
    if !entry.keywords.is_empty() {
        meta.extra.keywords = entry.keywords.clone();
    }
    meta.urls = entry.download_urls().map(str::to_string).collect();
    meta.installed_at = Some(Utc::now());
    meta.write(&root)?;

    let docset = Docset::load(&root, final_path, &meta, &entry.identifier)?;
    Ok((root, docset))
}

impl Inner {
    fn workspace(&self, identifier: &str) -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix(&format!("{WORKSPACE_PREFIX}{identifier}-"))
            .tempdir_in(&self.root)
            .map_err(|e| {
                DocsetError::storage_unavailable(&self.root, format!("cannot create workspace: {e}"))
            })
    }

    async fn run(self: Arc<Self>, entry: FeedEntry, job: InstallJob) {
        let identifier = entry.identifier.clone();
        let outcome = Arc::clone(&self)
            .pipeline(entry, &job)
            .await
            .map_err(|e| e.for_docset(&identifier));
        self.finish(&job, outcome);
    }

    async fn pipeline(self: Arc<Self>, entry: FeedEntry, job: &InstallJob) -> Result<DocsetMetadata> {
        let identifier = entry.identifier.clone();
        let workspace = self.workspace(&identifier)?;
        let archive_path = workspace.path().join(ARCHIVE_FILE);

        check_cancel(job)?;
        job.enter(JobPhase::Downloading);
        let progress = |received: u64, total: Option<u64>| {
            job.update(|p| p.set_bytes(received, total));
        };
        let bytes = self.download(&entry, &archive_path, &progress, job).await?;
        debug!("{}: downloaded {} bytes", identifier, bytes);

        if let Some(expected) = entry.expected_sha256() {
            let path = archive_path.clone();
            blocking(move || archive::verify_sha256(&path, &expected)).await?;
            debug!("{}: digest verified", identifier);
        }

        check_cancel(job)?;
        job.enter(JobPhase::Installing);
        let staging = workspace.path().join(STAGING_DIR);
        {
            let job = job.clone();
            let archive_path = archive_path.clone();
            let staging = staging.clone();
            blocking(move || {
                archive::extract(
                    &archive_path,
                    &staging,
                    |done, total| job.update(|p| p.set_entries(done, total)),
                    job.cancel_token(),
                )
            })
            .await?;
        }

        check_cancel(job)?;
        job.enter(JobPhase::Indexing);
        let final_path = self.install_path(&identifier);
        let (bundle_root, docset) = {
            let final_path = final_path.clone();
            let entry = entry.clone();
            blocking(move || prepare_bundle(&staging, &final_path, &entry)).await?
        };
        debug!(
            "{}: indexed {} symbols ({} skipped)",
            identifier,
            docset.index().len(),
            docset.index().skipped()
        );

        check_cancel(job)?;
        job.enter(JobPhase::Activating);
        let previous = workspace.path().join(PREVIOUS_DIR);
        let inner = Arc::clone(&self);
        let activating = job.clone();
        let metadata = blocking(move || {
            inner.activate(&activating, docset, &bundle_root, &final_path, &previous)
        })
        .await?;

        if let Err(e) = workspace.close() {
            warn!("{}: failed to remove job workspace: {}", identifier, e);
        }
        Ok(metadata)
    }

    /// Where `identifier` is installed, or will be
    ///
    /// An installed docset keeps its directory even when the name differs
    /// from `<identifier>.docset`.
    fn install_path(&self, identifier: &str) -> PathBuf {
        self.catalog
            .load()
            .get(identifier)
            .map(|d| d.metadata().path.clone())
            .unwrap_or_else(|| self.root.join(format!("{identifier}.{DOCSET_EXTENSION}")))
    }

    /// Try the entry's URL, then each mirror, until one downloads
    async fn download(
        &self,
        entry: &FeedEntry,
        archive_path: &Path,
        progress: ByteProgress<'_>,
        job: &InstallJob,
    ) -> Result<u64> {
        let mut last_error = None;
        for url in entry.download_urls() {
            match self
                .fetcher
                .download(url, archive_path, progress, job.cancel_token())
                .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_cancelled() || e.kind != ErrorKind::Transport => return Err(e),
                Err(e) => {
                    warn!("{}: download from {} failed: {}", entry.identifier, url, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| DocsetError::transport(&entry.identifier, "no download URL")))
    }

    /// Move the new docset into place and publish it
    ///
    /// Cancellation is honored until the catalog is stored: a job cancelled
    /// after the renames puts both directories back.
    fn activate(
        &self,
        job: &InstallJob,
        docset: Docset,
        bundle_root: &Path,
        final_path: &Path,
        previous: &Path,
    ) -> Result<DocsetMetadata> {
        let identifier = docset.identifier().to_string();
        let _writer = self.writer.lock();
        check_cancel(job)?;

        let replacing = final_path.exists();
        if replacing {
            self.storage.rename(final_path, previous).map_err(|e| {
                DocsetError::directory_in_use(
                    &identifier,
                    format!("cannot replace {}: {e}", final_path.display()),
                )
            })?;
        }

        if let Err(e) = self.storage.rename(bundle_root, final_path) {
            if replacing {
                if let Err(restore) = self.storage.rename(previous, final_path) {
                    warn!(
                        "{}: failed to restore previous docset: {}",
                        identifier, restore
                    );
                }
            }
            return Err(DocsetError::extraction(
                &identifier,
                format!("cannot move docset into {}: {e}", final_path.display()),
            ));
        }

        if job.is_cancelled() {
            match self.unwind(bundle_root, final_path, previous, replacing) {
                Ok(()) => return Err(DocsetError::cancelled(&identifier)),
                Err(e) => warn!(
                    "{}: cannot undo activation, keeping the new docset: {}",
                    identifier, e
                ),
            }
        }

        let metadata = docset.metadata().clone();
        let current = self.catalog.load_full();
        self.catalog.store(Arc::new(current.with(Arc::new(docset))));
        Ok(metadata)
    }

    /// Reverse the renames of `activate`
    fn unwind(
        &self,
        bundle_root: &Path,
        final_path: &Path,
        previous: &Path,
        replacing: bool,
    ) -> io::Result<()> {
        self.storage.rename(final_path, bundle_root)?;
        if replacing {
            if let Err(e) = self.storage.rename(previous, final_path) {
                // Never leave the final path empty
                self.storage.rename(bundle_root, final_path)?;
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove_committed(&self, identifier: &str) -> Result<()> {
        let workspace = self.workspace(identifier)?;
        let moved = workspace.path().join(REMOVED_DIR);

        {
            let _writer = self.writer.lock();
            let current = self.catalog.load_full();
            let path = current
                .get(identifier)
                .map(|d| d.metadata().path.clone())
                .ok_or_else(|| DocsetError::not_found(identifier))?;

            self.storage.rename(&path, &moved).map_err(|e| {
                DocsetError::directory_in_use(
                    identifier,
                    format!("cannot move {} out of place: {e}", path.display()),
                )
            })?;
            self.catalog.store(Arc::new(current.without(identifier)));
        }

        if let Err(e) = self.storage.remove_dir_all(&moved) {
            warn!("{}: failed to delete removed docset: {}", identifier, e);
        }
        info!("Removed docset {}", identifier);
        Ok(())
    }

    /// Settle the state table, then publish the outcome to every handle
    fn finish(&self, job: &InstallJob, outcome: Result<DocsetMetadata>) {
        let identifier = job.identifier();
        {
            let mut slots = self.slots.lock();
            let current = matches!(slots.get(identifier), Some(Slot::Job(j)) if j.same_job(job));
            if current {
                match &outcome {
                    Err(e) if !e.is_cancelled() => {
                        slots.insert(identifier.to_string(), Slot::Failed(e.clone()));
                    }
                    _ => {
                        slots.remove(identifier);
                    }
                }
            }
        }

        match &outcome {
            Ok(metadata) => info!(
                "Installed {} revision '{}' to {}",
                metadata.identifier,
                metadata.revision,
                metadata.path.display()
            ),
            Err(e) if e.is_cancelled() => info!("{}: cancelled", identifier),
            Err(e) => warn!("{}: {}", identifier, e),
        }

        job.complete(outcome);
    }
}
