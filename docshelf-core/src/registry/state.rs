//! Per-identifier lifecycle state

use super::job::{InstallJob, JobPhase};
use crate::error::DocsetError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DocsetState {
    NotInstalled,
    Downloading,
    Installing,
    Indexing,
    Installed,
    Removing,
    Failed(DocsetError),
}

impl DocsetState {
    /// True while a job or removal holds the identifier
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            DocsetState::Downloading
                | DocsetState::Installing
                | DocsetState::Indexing
                | DocsetState::Removing
        )
    }
}

impl fmt::Display for DocsetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocsetState::NotInstalled => f.write_str("not installed"),
            DocsetState::Downloading => f.write_str("downloading"),
            DocsetState::Installing => f.write_str("installing"),
            DocsetState::Indexing => f.write_str("indexing"),
            DocsetState::Installed => f.write_str("installed"),
            DocsetState::Removing => f.write_str("removing"),
            DocsetState::Failed(e) => write!(f, "failed: {}", e.detail),
        }
    }
}

/// Uncommitted state of an identifier
///
/// Identifiers without a slot are simply installed or not, as the catalog
/// says.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Job(InstallJob),
    Removing,
    Failed(DocsetError),
}

impl Slot {
    pub(crate) fn state(&self) -> DocsetState {
        match self {
            Slot::Job(job) => match job.progress().phase {
                JobPhase::Downloading => DocsetState::Downloading,
                JobPhase::Installing => DocsetState::Installing,
                // Finished jobs leave the table before publishing their outcome
                JobPhase::Indexing | JobPhase::Activating | JobPhase::Done | JobPhase::Failed => {
                    DocsetState::Indexing
                }
            },
            Slot::Removing => DocsetState::Removing,
            Slot::Failed(e) => DocsetState::Failed(e.clone()),
        }
    }

    /// Active job or removal in progress
    pub(crate) fn is_busy(&self) -> bool {
        match self {
            Slot::Job(job) => !job.is_finished(),
            Slot::Removing => true,
            Slot::Failed(_) => false,
        }
    }
}

/// Aggregate job counts per phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub downloading: usize,
    pub installing: usize,
    pub indexing: usize,
    /// Mean phase percentage over all active jobs
    pub percent: u8,
}

impl Activity {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a InstallJob>) -> Self {
        let mut activity = Activity::default();
        let mut sum = 0u64;
        let mut count = 0u64;

        for job in jobs {
            let progress = job.progress();
            match progress.phase {
                JobPhase::Downloading => activity.downloading += 1,
                JobPhase::Installing => activity.installing += 1,
                JobPhase::Indexing | JobPhase::Activating => activity.indexing += 1,
                JobPhase::Done | JobPhase::Failed => continue,
            }
            sum += u64::from(progress.percent);
            count += 1;
        }

        if count > 0 {
            activity.percent = (sum / count) as u8;
        }
        activity
    }

    pub fn is_idle(&self) -> bool {
        self.downloading == 0 && self.installing == 0 && self.indexing == 0
    }
}
