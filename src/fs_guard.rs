use anyhow::{anyhow, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::InputError;

/// Reads a file after verifying it is not a symlink and is within `max_bytes`.
///
/// NOTE: narrow TOCTOU window between `symlink_metadata()` and `fs::read()`.
/// Profiles and signed binaries come from the local build host, so the check
/// is about catching accidental links, not a hostile filesystem.
pub fn read_validated(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.file_type().is_symlink() {
        return Err(anyhow!("Refusing to read symlink: {}", path.display()));
    }
    if meta.len() > max_bytes {
        return Err(anyhow!(
            "File too large: {} ({} bytes, max {max_bytes} bytes)",
            path.display(),
            meta.len(),
        ));
    }
    fs::read(path).with_context(|| format!("read {}", path.display()))
}

/// Resolves an artifact root, failing with [`InputError`] when it is absent
/// or not a directory.
pub fn require_dir(path: &Path) -> Result<PathBuf, InputError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InputError::MissingRoot(path.to_path_buf()))
        }
        Err(e) => {
            return Err(InputError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };
    if !meta.is_dir() {
        return Err(InputError::NotADirectory(path.to_path_buf()));
    }
    path.canonicalize().map_err(|e| InputError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
