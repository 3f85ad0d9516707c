//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! implement the rename-or-copy move used when publishing payloads.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

/// EXDEV.
#[cfg(unix)]
const CROSS_DEVICE_CODE: i32 = 18;
/// ERROR_NOT_SAME_DEVICE.
#[cfg(windows)]
const CROSS_DEVICE_CODE: i32 = 17;

/// ENOSPC.
#[cfg(unix)]
const DISK_FULL_CODE: i32 = 28;
/// ERROR_DISK_FULL.
#[cfg(windows)]
const DISK_FULL_CODE: i32 = 112;

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    ensure_dir_all_with_op("creating directory", path).await
}

/// Ensure the parent directory of a file path exists.
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    ensure_dir_all_with_op("creating parent directory", parent).await
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Remove a directory tree, logging instead of failing.
///
/// Returns `true` when the directory is gone afterwards (including when it
/// never existed).
pub async fn remove_dir_best_effort(path: &Path) -> bool {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed directory");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove directory");
            false
        }
    }
}

fn is_cross_device(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(CROSS_DEVICE_CODE)
}

fn is_disk_full(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::StorageFull || e.raw_os_error() == Some(DISK_FULL_CODE)
}

/// Move a file to `dest`, creating parent directories.
///
/// A plain rename is tried first. When source and destination live on
/// different filesystems the file is copied, the copy is size-verified and
/// the source removed.
pub async fn move_file(source: &Path, dest: &Path) -> Result<u64> {
    let source_size = tokio::fs::metadata(source)
        .await
        .map_err(|e| io_error("reading source metadata", source, e))?
        .len();

    ensure_parent_dir(dest).await?;

    match tokio::fs::rename(source, dest).await {
        Ok(()) => return Ok(source_size),
        Err(e) if is_cross_device(&e) => {
            debug!(
                source = %source.display(),
                dest = %dest.display(),
                "Rename crosses filesystems, falling back to copy"
            );
        }
        Err(e) => return Err(io_error("renaming payload", source, e)),
    }

    if let Err(e) = tokio::fs::copy(source, dest).await {
        let _ = tokio::fs::remove_file(dest).await;
        if is_disk_full(&e) {
            return Err(Error::publish(format!(
                "insufficient disk space while copying {} bytes to {}",
                source_size,
                dest.display()
            )));
        }
        return Err(io_error("copying payload", dest, e));
    }

    let dest_size = tokio::fs::metadata(dest)
        .await
        .map_err(|e| io_error("reading destination metadata", dest, e))?
        .len();
    if dest_size != source_size {
        let _ = tokio::fs::remove_file(dest).await;
        return Err(Error::publish(format!(
            "size mismatch after copy: source {} bytes, destination {} bytes",
            source_size, dest_size
        )));
    }

    tokio::fs::remove_file(source)
        .await
        .map_err(|e| io_error("removing source after copy", source, e))?;

    Ok(dest_size)
}

/// Recursively list regular files under `root` together with their sizes.
pub async fn list_files(root: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_error("reading directory", &dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("reading directory entry", &dir, e))?
        {
            let path = entry.path();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| io_error("reading metadata", &path, e))?;
            if meta.is_dir() {
                pending.push(path);
            } else if meta.is_file() {
                files.push((path, meta.len()));
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_only_exdev_counts_as_cross_device() {
        // EXDEV
        assert!(is_cross_device(&std::io::Error::from_raw_os_error(18)));
        // EEXIST
        assert!(!is_cross_device(&std::io::Error::from_raw_os_error(17)));
        // EHOSTDOWN is not a full disk.
        assert!(!is_disk_full(&std::io::Error::from_raw_os_error(112)));
        assert!(is_disk_full(&std::io::Error::from_raw_os_error(28)));
    }

    #[tokio::test]
    async fn test_move_file_creates_parent_and_removes_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("payload.mkv");
        tokio::fs::write(&source, b"0123456789").await.unwrap();
        let dest = dir.path().join("library/Show/Season 01/file.mkv");

        let size = move_file(&source, &dest).await.unwrap();

        assert_eq!(size, 10);
        assert!(!source.exists());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_move_file_missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = move_file(&dir.path().join("nope"), &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_list_files_recurses() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("a/b")).await.unwrap();
        tokio::fs::write(dir.path().join("top.txt"), b"1").await.unwrap();
        tokio::fs::write(dir.path().join("a/b/deep.mkv"), b"123").await.unwrap();

        let mut files = list_files(dir.path()).await.unwrap();
        files.sort_by_key(|(_, size)| *size);

        assert_eq!(files.len(), 2);
        assert_eq!(files[1].1, 3);
        assert!(files[1].0.ends_with("a/b/deep.mkv"));
    }

    #[tokio::test]
    async fn test_remove_dir_best_effort_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(remove_dir_best_effort(&dir.path().join("missing")).await);
    }
}
