//! SHA-256 content digests.
//!
//! Digests depend only on byte content. Symlinks are never followed: a link
//! is hashed as its target string, so two trees agree on a link only when
//! both point at the same place.

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::{fs, io::Read, path::Path};
use tracing::debug;

use crate::error::InputError;

/// Largest single file repcheck will hash.
pub const MAX_HASH_BYTES: u64 = 2 * 1024 * 1024 * 1024; // 2GB

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Streams `p` through SHA-256 with a 64 KB buffer.
pub fn sha256_file(p: &Path) -> Result<String> {
    let meta = fs::symlink_metadata(p).with_context(|| format!("stat {}", p.display()))?;
    if meta.file_type().is_symlink() {
        let target = fs::read_link(p).with_context(|| format!("readlink {}", p.display()))?;
        let mut h = Sha256::new();
        h.update(b"symlink:");
        h.update(target.to_string_lossy().as_bytes());
        return Ok(hex::encode(h.finalize()));
    }
    if !meta.is_file() {
        return Err(anyhow!("Not a regular file: {}", p.display()));
    }
    if meta.len() > MAX_HASH_BYTES {
        return Err(InputError::Limit(format!(
            "{} is {} bytes (max {MAX_HASH_BYTES} bytes)",
            p.display(),
            meta.len()
        ))
        .into());
    }

    let mut f = fs::File::open(p).with_context(|| format!("open {}", p.display()))?;
    let mut h = Sha256::new();
    #[allow(clippy::large_stack_arrays)]
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", p.display()))?;
        if n == 0 {
            break;
        }
        #[allow(clippy::indexing_slicing)]
        h.update(&buf[..n]);
    }
    Ok(hex::encode(h.finalize()))
}

/// Like [`sha256_file`], but a missing or unreadable file yields `None`
/// ("no digest available") so a tier can report which file is absent.
pub fn try_sha256(p: &Path) -> Option<String> {
    match sha256_file(p) {
        Ok(d) => Some(d),
        Err(e) => {
            debug!(path = %p.display(), error = %format!("{e:#}"), "no digest available");
            None
        }
    }
}
