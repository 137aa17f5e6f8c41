//! Docset archive extraction
//!
//! Bundles are gzip-compressed tarballs. Extraction makes two passes: the
//! first counts entries so progress can be reported as a fraction, the
//! second unpacks them one at a time.

use crate::docset::{dash, CONTENT_DIR, META_FILE, SYMBOLS_FILE};
use crate::error::{DocsetError, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

fn open_archive(path: &Path) -> Result<tar::Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(path).map_err(|e| extraction_error(path, e))?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

fn extraction_error(path: &Path, detail: impl std::fmt::Display) -> DocsetError {
    DocsetError::extraction(path.display().to_string(), detail)
}

/// Count the entries of a `.tar.gz` archive
pub fn count_entries(archive_path: &Path) -> Result<u64> {
    let mut archive = open_archive(archive_path)?;
    let mut total = 0;
    for entry in archive
        .entries()
        .map_err(|e| extraction_error(archive_path, e))?
    {
        entry.map_err(|e| extraction_error(archive_path, e))?;
        total += 1;
    }
    Ok(total)
}

/// Unpack `archive_path` into `dest_dir`, which must not exist yet
///
/// `on_progress(done, total)` runs after every entry. The token is checked
/// between entries. On failure `dest_dir` is removed again.
pub fn extract(
    archive_path: &Path,
    dest_dir: &Path,
    mut on_progress: impl FnMut(u64, u64),
    cancel: &CancellationToken,
) -> Result<u64> {
    if dest_dir.exists() {
        return Err(DocsetError::destination_exists(dest_dir));
    }

    let total = count_entries(archive_path)?;
    on_progress(0, total);

    std::fs::create_dir_all(dest_dir).map_err(|e| extraction_error(dest_dir, e))?;

    match unpack_entries(archive_path, dest_dir, total, &mut on_progress, cancel) {
        Ok(done) => {
            tracing::debug!(
                "Extracted {} entries from {} into {}",
                done,
                archive_path.display(),
                dest_dir.display()
            );
            Ok(done)
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(dest_dir) {
                tracing::warn!(
                    "Failed to clean up partial extraction {}: {}",
                    dest_dir.display(),
                    cleanup
                );
            }
            Err(e)
        }
    }
}

fn unpack_entries(
    archive_path: &Path,
    dest_dir: &Path,
    total: u64,
    on_progress: &mut impl FnMut(u64, u64),
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut archive = open_archive(archive_path)?;
    let mut done = 0;

    for entry in archive
        .entries()
        .map_err(|e| extraction_error(archive_path, e))?
    {
        if cancel.is_cancelled() {
            return Err(DocsetError::cancelled(&archive_path.display().to_string()));
        }

        let mut entry = entry.map_err(|e| extraction_error(archive_path, e))?;
        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|e| extraction_error(archive_path, e))?;
        if !unpacked {
            let name = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(extraction_error(
                archive_path,
                format!("entry '{name}' escapes the destination directory"),
            ));
        }

        done += 1;
        on_progress(done, total);
    }

    Ok(done)
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| extraction_error(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| extraction_error(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Check a downloaded archive against the digest a feed advertised
pub fn verify_sha256(path: &Path, expected_hex: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual != expected_hex {
        return Err(DocsetError::corrupt(
            path.display().to_string(),
            format!("digest mismatch: expected sha256:{expected_hex}, got sha256:{actual}"),
        ));
    }
    Ok(())
}

/// Find the bundle root inside an extraction directory
///
/// Bundles either hold their files at the top level or inside a single
/// wrapping directory (`Rust.docset/...`, `Bash.docset/Contents/...`).
pub fn locate_bundle_root(staging: &Path) -> Result<PathBuf> {
    let is_root = |dir: &Path| {
        dir.join(SYMBOLS_FILE).is_file()
            || dir.join(META_FILE).is_file()
            || dir.join(CONTENT_DIR).is_dir()
            || dir.join(dash::CONTENTS_DIR).is_dir()
    };

    if is_root(staging) {
        return Ok(staging.to_path_buf());
    }

    let dirs: Vec<PathBuf> = std::fs::read_dir(staging)
        .map_err(|e| extraction_error(staging, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    match dirs.as_slice() {
        [single] if is_root(single) => Ok(single.clone()),
        _ => Err(DocsetError::corrupt(
            staging.display().to_string(),
            format!("archive contains no {SYMBOLS_FILE} or {CONTENT_DIR}/"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, Header};
    use tempfile::TempDir;

    fn write_archive(dir: &Path, files: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("bundle.tgz");
        let file = File::create(&path).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, contents) in files {
            let mut header = Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_extract_reports_every_entry() {
        let dir = TempDir::new().unwrap();
        let archive = write_archive(
            dir.path(),
            &[
                ("Go.docset/symbols.json", "[]"),
                ("Go.docset/Documents/index.html", "<html/>"),
                ("Go.docset/icon.png", "png"),
            ],
        );
        let dest = dir.path().join("staging");

        let mut calls = Vec::new();
        let done = extract(&archive, &dest, |d, t| calls.push((d, t)), &CancellationToken::new())
            .unwrap();

        assert_eq!(done, 3);
        assert_eq!(calls, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
        assert_eq!(locate_bundle_root(&dest).unwrap(), dest.join("Go.docset"));
    }

    #[test]
    fn test_existing_destination_is_refused() {
        let dir = TempDir::new().unwrap();
        let archive = write_archive(dir.path(), &[("symbols.json", "[]")]);
        let dest = dir.path().join("staging");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), "mine").unwrap();

        let err = extract(&archive, &dest, |_, _| {}, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DestinationExists);
        assert!(dest.join("keep.txt").exists());
    }

    #[test]
    fn test_truncated_archive_cleans_up() {
        use std::io::Write;

        // Header announces 1000 bytes but only 10 follow
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.tgz");
        let mut header = Header::new_gnu();
        header.set_path("symbols.json").unwrap();
        header.set_size(1000);
        header.set_mode(0o644);
        header.set_cksum();
        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(header.as_bytes()).unwrap();
        encoder.write_all(&[b'x'; 10]).unwrap();
        encoder.finish().unwrap();
        let dest = dir.path().join("staging");

        let err = extract(&archive, &dest, |_, _| {}, &CancellationToken::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Extraction);
        assert!(!dest.exists());
    }

    #[test]
    fn test_cancelled_extraction_cleans_up() {
        let dir = TempDir::new().unwrap();
        let archive = write_archive(dir.path(), &[("symbols.json", "[]")]);
        let dest = dir.path().join("staging");
        let token = CancellationToken::new();
        token.cancel();

        let err = extract(&archive, &dest, |_, _| {}, &token).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[test]
    fn test_verify_sha256() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"test data").unwrap();
        let expected = hex::encode(Sha256::digest(b"test data"));

        verify_sha256(&path, &expected).unwrap();
        let err = verify_sha256(&path, "00").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptDocset);
    }

    #[test]
    fn test_locate_bundle_root_rejects_unrelated_archive() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        let err = locate_bundle_root(dir.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptDocset);
    }

    #[test]
    fn test_locate_wrapped_dash_bundle() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("Bash.docset");
        std::fs::create_dir_all(bundle.join("Contents").join("Resources")).unwrap();
        assert_eq!(locate_bundle_root(dir.path()).unwrap(), bundle);
    }
}
