use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::error::{Error, Result};

/// The configured receive directory must already exist.
pub async fn ensure_directory(path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|source| Error::InvalidPath {
            path: path.clone(),
            source,
        })?;
    if !metadata.is_dir() {
        return Err(Error::NotADirectory(path));
    }
    Ok(path)
}

/// The file to send must exist and not be a directory.
pub async fn ensure_file(path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|source| Error::InvalidPath {
            path: path.clone(),
            source,
        })?;
    if metadata.is_dir() {
        return Err(Error::NotAFile(path));
    }
    Ok(path)
}

/// Create (or truncate) a destination file, owner read/write only on Unix.
pub async fn create_destination_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

/// Reduce a received file name to a single safe path component.
pub fn sanitize_file_name(file_name: &str) -> String {
    // Only the last component counts, whichever separator the sender used.
    let file_name = file_name
        .split(|c| c == '/' || c == '\\')
        .last()
        .unwrap_or_default();

    let clean_name: String = file_name.chars().filter(|c| !c.is_control()).collect();

    // https://learn.microsoft.com/en-us/windows/win32/fileio/naming-a-file
    let reserved_names = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    if reserved_names
        .iter()
        .any(|&r| clean_name.eq_ignore_ascii_case(r))
        || clean_name == ".."
        || clean_name == "."
        || clean_name.trim().is_empty()
    {
        return "unknown_file".to_string();
    }

    clean_name
}
