//! Filesystem operations the registry performs on the storage root

use super::WORKSPACE_PREFIX;
use crate::error::{DocsetError, Result};
use std::io;
use std::path::Path;

pub trait StorageBackend: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Fail with `StorageUnavailable` unless `root` is an existing, writable directory
    ///
    /// Permission bits alone miss read-only mounts and ACLs, so a scratch
    /// file is created and removed as well.
    fn check_root(&self, root: &Path) -> Result<()> {
        let metadata = std::fs::metadata(root)
            .map_err(|e| DocsetError::storage_unavailable(root, format!("does not exist: {e}")))?;
        if !metadata.is_dir() {
            return Err(DocsetError::storage_unavailable(root, "not a directory"));
        }
        if metadata.permissions().readonly() {
            return Err(DocsetError::storage_unavailable(root, "read-only"));
        }
        check_writable(root)
    }
}

/// Create and drop a scratch file in `root`
pub(crate) fn check_writable(root: &Path) -> Result<()> {
    tempfile::Builder::new()
        .prefix(&format!("{WORKSPACE_PREFIX}write-"))
        .tempfile_in(root)
        .map(drop)
        .map_err(|e| DocsetError::storage_unavailable(root, format!("not writable: {e}")))
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl StorageBackend for LocalStorage {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_missing_root_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = LocalStorage
            .check_root(&dir.path().join("nope"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StorageUnavailable);
    }

    #[test]
    fn test_file_root_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(
            LocalStorage.check_root(&file).unwrap_err().kind,
            ErrorKind::StorageUnavailable
        );
    }

    /// A directory whose path leaves no room for a file name
    #[cfg(target_os = "linux")]
    fn path_at_length_limit(base: &Path) -> std::path::PathBuf {
        const TARGET_LEN: usize = 4080;
        let mut path = base.to_path_buf();
        while path.as_os_str().len() + 201 <= TARGET_LEN {
            path.push("d".repeat(200));
        }
        let rest = TARGET_LEN - path.as_os_str().len() - 1;
        path.push("d".repeat(rest.max(1)));
        path
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_root_that_cannot_hold_files_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let root = path_at_length_limit(dir.path());
        std::fs::create_dir_all(&root).unwrap();
        assert!(!std::fs::metadata(&root).unwrap().permissions().readonly());

        let err = LocalStorage.check_root(&root).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StorageUnavailable);
        assert!(err.detail.contains("not writable"), "{}", err.detail);
    }

    #[test]
    fn test_writable_root_check_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        LocalStorage.check_root(dir.path()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_read_only_root_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("ro");
        std::fs::create_dir(&root).unwrap();

        let mut perms = std::fs::metadata(&root).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&root, perms.clone()).unwrap();

        let err = LocalStorage.check_root(&root).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StorageUnavailable);
        assert!(err.detail.contains("read-only"));

        perms.set_readonly(false);
        std::fs::set_permissions(&root, perms).unwrap();
        LocalStorage.check_root(&root).unwrap();
    }
}
