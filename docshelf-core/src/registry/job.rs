//! Install and update job handles

use crate::docset::DocsetMetadata;
use crate::error::{DocsetError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobPhase {
    Downloading,
    Installing,
    Indexing,
    Activating,
    Done,
    Failed,
}

impl JobPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobPhase::Downloading => "Downloading",
            JobPhase::Installing => "Installing",
            JobPhase::Indexing => "Indexing",
            JobPhase::Activating => "Activating",
            JobPhase::Done => "Done",
            JobPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Whether a job installs a new docset or replaces an installed one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    Install,
    Update,
}

/// Snapshot of a job's progress
///
/// `percent` is relative to the current phase.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub phase: JobPhase,
    pub percent: u8,
    pub bytes_received: u64,
    pub bytes_total: Option<u64>,
    pub entries_done: u64,
    pub entries_total: u64,
    pub error: Option<DocsetError>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            phase: JobPhase::Downloading,
            percent: 0,
            bytes_received: 0,
            bytes_total: None,
            entries_done: 0,
            entries_total: 0,
            error: None,
        }
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.min(total) * 100 / total) as u8
}

impl JobProgress {
    pub(crate) fn set_bytes(&mut self, received: u64, total: Option<u64>) {
        self.bytes_received = received;
        self.bytes_total = total;
        self.percent = total.map(|t| percent(received, t)).unwrap_or(0);
    }

    pub(crate) fn set_entries(&mut self, done: u64, total: u64) {
        self.entries_done = done;
        self.entries_total = total;
        self.percent = percent(done, total);
    }

    pub(crate) fn enter(&mut self, phase: JobPhase) {
        self.phase = phase;
        self.percent = if phase == JobPhase::Done { 100 } else { 0 };
    }
}

struct JobShared {
    identifier: String,
    kind: JobKind,
    progress: watch::Sender<JobProgress>,
    cancel: CancellationToken,
    outcome: Mutex<Option<Result<DocsetMetadata>>>,
}

/// Handle to one in-flight install or update
///
/// Handles are cheap to clone; every clone observes the same job.
#[derive(Clone)]
pub struct InstallJob {
    shared: Arc<JobShared>,
}

impl fmt::Debug for InstallJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallJob")
            .field("identifier", &self.shared.identifier)
            .field("kind", &self.shared.kind)
            .field("phase", &self.progress().phase)
            .finish()
    }
}

impl InstallJob {
    pub(crate) fn new(identifier: &str, kind: JobKind) -> Self {
        let (progress, _) = watch::channel(JobProgress::default());
        Self {
            shared: Arc::new(JobShared {
                identifier: identifier.to_string(),
                kind,
                progress,
                cancel: CancellationToken::new(),
                outcome: Mutex::new(None),
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn kind(&self) -> JobKind {
        self.shared.kind
    }

    pub fn progress(&self) -> JobProgress {
        self.shared.progress.borrow().clone()
    }

    /// Receive every progress change
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.shared.progress.subscribe()
    }

    /// Request cancellation; the job stops at the next chunk or entry
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.outcome.lock().is_some()
    }

    /// True when both handles refer to the same job
    pub fn same_job(&self, other: &InstallJob) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Wait for the job to finish
    pub async fn wait(&self) -> Result<DocsetMetadata> {
        let mut rx = self.shared.progress.subscribe();
        loop {
            let outcome = self.shared.outcome.lock().clone();
            if let Some(outcome) = outcome {
                return outcome;
            }
            // The sender lives as long as `self`, so this only returns on a change
            if rx.changed().await.is_err() {
                return Err(DocsetError::cancelled(&self.shared.identifier));
            }
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut JobProgress)) {
        self.shared.progress.send_modify(f);
    }

    pub(crate) fn enter(&self, phase: JobPhase) {
        tracing::debug!("{}: {}", self.shared.identifier, phase);
        self.update(|p| p.enter(phase));
    }

    /// Record the outcome, then wake every waiter
    pub(crate) fn complete(&self, outcome: Result<DocsetMetadata>) {
        let error = outcome.as_ref().err().cloned();
        *self.shared.outcome.lock() = Some(outcome);
        self.update(|p| match error {
            None => p.enter(JobPhase::Done),
            Some(e) => {
                p.phase = JobPhase::Failed;
                p.error = Some(e);
            }
        });
    }
}
