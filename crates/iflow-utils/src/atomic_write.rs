//! Atomic file operations with cross-platform support
//!
//! This module provides atomic file write operations with:
//! - Temporary file creation with fsync
//! - Atomic rename (same filesystem)
//! - Windows rename retry with exponential backoff (≤ 250ms total)

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

#[cfg(target_os = "windows")]
use std::{thread, time::Duration};

/// Atomically write content to a file using temp file + fsync + rename
///
/// State transitions on disk (plan, intake, proofs, test reports) go through
/// this so a crash mid-write never leaves a torn JSON document behind.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    // Normalize line endings to LF
    let normalized_content = normalize_line_endings(content);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    // Create temporary file in the same directory as the target
    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized_content.as_bytes())
        .with_context(|| "Failed to write content to temporary file")?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| "Failed to fsync temporary file")?;

    atomic_rename(temp_file, path.as_std_path())
        .with_context(|| format!("Failed to atomically write file: {path}"))?;

    Ok(())
}

/// Normalize line endings to LF
fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Attempt atomic rename with platform-specific retry logic
///
/// On Windows, implements exponential backoff with ≤ 250ms total.
#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &Path) -> Result<()> {
    use std::io::ErrorKind;

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;
    const MAX_TOTAL_DELAY_MS: u64 = 250;

    let mut retry_count = 0;
    let mut total_delay_ms = 0;

    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(()),
            Err(persist_error) => {
                if retry_count >= MAX_RETRIES {
                    return Err(anyhow::anyhow!(persist_error.error));
                }

                let is_retryable = matches!(
                    persist_error.error.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Other
                );
                if !is_retryable {
                    return Err(anyhow::anyhow!(persist_error.error));
                }

                let delay_ms = INITIAL_DELAY_MS * 2_u64.pow(retry_count);
                if total_delay_ms + delay_ms > MAX_TOTAL_DELAY_MS {
                    let remaining = MAX_TOTAL_DELAY_MS.saturating_sub(total_delay_ms);
                    if remaining > 0 {
                        thread::sleep(Duration::from_millis(remaining));
                    }
                    return persist_error
                        .file
                        .persist(target)
                        .map(|_| ())
                        .map_err(|e| anyhow::anyhow!(e.error));
                }

                thread::sleep(Duration::from_millis(delay_ms));
                total_delay_ms += delay_ms;
                retry_count += 1;
                temp_file = persist_error.file;
            }
        }
    }
}

/// Attempt atomic rename (Unix: no retry needed)
#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> Result<()> {
    temp_file
        .persist(target)
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!(e.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(
            normalize_line_endings("line1\r\nline2\r\nline3"),
            "line1\nline2\nline3"
        );
        assert_eq!(
            normalize_line_endings("line1\rline2\rline3"),
            "line1\nline2\nline3"
        );
    }

    #[test]
    fn test_atomic_write_basic() {
        let temp_dir = TempDir::new().unwrap();
        let path_buf = temp_dir.path().join("test.txt");
        let file_path = Utf8Path::from_path(path_buf.as_path()).unwrap();

        let content = "test content\nwith multiple lines";
        write_file_atomic(file_path, content).unwrap();

        assert!(file_path.exists());
        let read_content = fs::read_to_string(file_path.as_std_path()).unwrap();
        assert_eq!(read_content, content);
    }

    #[test]
    fn test_atomic_write_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path_buf = temp_dir.path().join("nested").join("dir").join("test.txt");
        let nested_path = Utf8Path::from_path(path_buf.as_path()).unwrap();

        write_file_atomic(nested_path, "test content").unwrap();
        assert!(nested_path.exists());
    }

    #[test]
    fn test_atomic_write_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path_buf = temp_dir.path().join("overwrite.txt");
        let file_path = Utf8Path::from_path(path_buf.as_path()).unwrap();

        write_file_atomic(file_path, "initial content").unwrap();
        write_file_atomic(file_path, "new content").unwrap();

        let read_content = fs::read_to_string(file_path.as_std_path()).unwrap();
        assert_eq!(read_content, "new content");
    }

    #[test]
    fn test_atomic_write_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let path_buf = temp_dir.path().join("empty.txt");
        let file_path = Utf8Path::from_path(path_buf.as_path()).unwrap();

        write_file_atomic(file_path, "").unwrap();
        assert_eq!(fs::read_to_string(file_path.as_std_path()).unwrap(), "");
    }
}
