//! Docset lifecycle error types
//!
//! Every failure is scoped to a single docset (or a single feed) and carries
//! the identifier it belongs to plus a human-readable detail string, so the
//! same error can be shown to the user and stored on a failed job.

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// The closed set of failure categories surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network or local transport failure while fetching a feed or archive
    Transport,
    /// The feed document is not a list of docset records
    MalformedFeed,
    /// Extraction target already exists
    DestinationExists,
    /// The archive is truncated, unreadable, or an entry could not be written
    Extraction,
    /// The symbol table or content store is missing or malformed
    CorruptDocset,
    /// The storage root is absent or read-only
    StorageUnavailable,
    /// The docset directory could not be moved away for deletion
    DirectoryInUse,
    /// An install or update job is active for the docset
    Busy,
    /// The job was cancelled by the caller
    Cancelled,
    /// No docset with this identifier is known
    NotFound,
}

impl ErrorKind {
    fn describe(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport error",
            ErrorKind::MalformedFeed => "invalid docset feed",
            ErrorKind::DestinationExists => "destination already exists",
            ErrorKind::Extraction => "extraction failed",
            ErrorKind::CorruptDocset => "corrupt docset",
            ErrorKind::StorageUnavailable => "storage unavailable",
            ErrorKind::DirectoryInUse => "directory in use",
            ErrorKind::Busy => "docset is busy",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::NotFound => "not found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A docset registry failure
///
/// `target` is the docset identifier once the registry has tagged the error;
/// feed and extractor errors start out targeting the URL or path involved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} ({target}): {detail}")]
pub struct DocsetError {
    pub kind: ErrorKind,
    pub target: String,
    pub detail: String,
}

impl DocsetError {
    pub fn new(kind: ErrorKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            detail: detail.into(),
        }
    }

    pub fn transport(target: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Transport, target, detail.to_string())
    }

    pub fn malformed_feed(target: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::MalformedFeed, target, detail.to_string())
    }

    pub fn destination_exists(path: &Path) -> Self {
        Self::new(
            ErrorKind::DestinationExists,
            path.display().to_string(),
            "refusing to extract over an existing directory",
        )
    }

    pub fn extraction(target: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Extraction, target, detail.to_string())
    }

    pub fn corrupt(target: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::CorruptDocset, target, detail.to_string())
    }

    pub fn storage_unavailable(path: &Path, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::StorageUnavailable,
            path.display().to_string(),
            detail.to_string(),
        )
    }

    pub fn directory_in_use(identifier: &str, detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::DirectoryInUse, identifier, detail.to_string())
    }

    pub fn busy(identifier: &str) -> Self {
        Self::new(
            ErrorKind::Busy,
            identifier,
            "an install or update is in progress; wait for it to finish or cancel it",
        )
    }

    pub fn cancelled(identifier: &str) -> Self {
        Self::new(ErrorKind::Cancelled, identifier, "cancelled by user")
    }

    pub fn not_found(identifier: &str) -> Self {
        Self::new(ErrorKind::NotFound, identifier, "no such docset")
    }

    /// Re-target the error at a docset identifier
    ///
    /// The previous target (a URL or path) is kept in the detail string.
    pub fn for_docset(mut self, identifier: &str) -> Self {
        if self.target != identifier {
            if !self.target.is_empty() {
                self.detail = format!("{} ({})", self.detail, self.target);
            }
            self.target = identifier.to_string();
        }
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, DocsetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_target_and_detail() {
        let err = DocsetError::busy("python~3");
        let msg = err.to_string();
        assert!(msg.starts_with("docset is busy (python~3)"));
        assert!(msg.contains("in progress"));
    }

    #[test]
    fn test_for_docset_keeps_previous_target_in_detail() {
        let err = DocsetError::transport("https://example.com/a.tgz", "connection reset")
            .for_docset("rust");
        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(err.target, "rust");
        assert_eq!(err.detail, "connection reset (https://example.com/a.tgz)");

        // Tagging twice is a no-op
        let again = err.clone().for_docset("rust");
        assert_eq!(again, err);
    }
}
