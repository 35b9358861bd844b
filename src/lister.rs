//! Deterministic listings of artifact trees.
//!
//! An [`ArtifactTree`] is built fresh for every run. Its entries are sorted
//! byte-wise on their `/`-separated relative path and contain no duplicates,
//! which is exactly what [`crate::differ::diff`] requires of its inputs.

use anyhow::{Context, Result};
use std::{
    cell::OnceCell,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

use crate::{
    error::{InputError, InvariantViolation},
    fs_guard, hasher,
};

/// Upper bound on files per tree.
pub const MAX_TREE_FILES: usize = 200_000;

/// One file in a tree. The digest is computed on first request and cached
/// for the lifetime of the tree.
#[derive(Debug)]
pub struct FileEntry {
    path: String,
    len: u64,
    abs: PathBuf,
    digest: OnceCell<Option<String>>,
}

impl FileEntry {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// SHA-256 of the file, or `None` if it can no longer be read.
    pub fn digest(&self) -> Option<&str> {
        self.digest
            .get_or_init(|| hasher::try_sha256(&self.abs))
            .as_deref()
    }
}

impl AsRef<str> for FileEntry {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

#[derive(Debug)]
pub struct ArtifactTree {
    name: String,
    root: PathBuf,
    entries: Vec<FileEntry>,
}

impl ArtifactTree {
    /// Walks `root` without following symlinks and lists every regular file
    /// and symlink relative to it.
    pub fn scan(name: &str, root: &Path) -> Result<Self> {
        let root = fs_guard::require_dir(root)?;
        let mut entries = Vec::new();

        for e in WalkDir::new(&root).follow_links(false) {
            let e = e.map_err(|err| InputError::Unreadable {
                path: err
                    .path()
                    .map_or_else(|| root.clone(), Path::to_path_buf),
                reason: err.to_string(),
            })?;
            let ft = e.file_type();
            if !(ft.is_file() || ft.is_symlink()) {
                continue;
            }
            if entries.len() >= MAX_TREE_FILES {
                return Err(InputError::Limit(format!(
                    "{name} tree at {} has more than {MAX_TREE_FILES} files",
                    root.display()
                ))
                .into());
            }
            let rel = e.path().strip_prefix(&root).with_context(|| {
                format!(
                    "Path '{}' should be prefixed with '{}'",
                    e.path().display(),
                    root.display()
                )
            })?;
            let len = e.path().symlink_metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(FileEntry {
                path: normalize_rel_path(rel).ok_or_else(|| InputError::Unreadable {
                    path: e.path().to_path_buf(),
                    reason: "file name is not valid UTF-8".to_string(),
                })?,
                len,
                abs: e.path().to_path_buf(),
                digest: OnceCell::new(),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        check_unique(&entries)?;

        Ok(Self {
            name: name.to_string(),
            root,
            entries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, rel: &str) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(rel))
            .ok()
            .and_then(|i| self.entries.get(i))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(FileEntry::path)
    }
}

/// `None` when a component is not UTF-8. A lossy conversion could map two
/// distinct names onto one path.
fn normalize_rel_path(path: &Path) -> Option<String> {
    let mut segs = Vec::new();
    for c in path.components() {
        if let Component::Normal(seg) = c {
            segs.push(seg.to_str()?);
        }
    }
    Some(segs.join("/"))
}

/// Sorted entries must be strictly ascending.
fn check_unique(entries: &[FileEntry]) -> Result<(), InvariantViolation> {
    let dup = entries.windows(2).find_map(|w| match w {
        [a, b] if a.path == b.path => Some(a),
        _ => None,
    });
    match dup {
        Some(e) => Err(InvariantViolation::Duplicate {
            side: "lister",
            path: e.path.clone(),
        }),
        None => Ok(()),
    }
}
