//! Deep inspection of container files.
//!
//! Image formats such as the Java `modules` file or a jar can be rewritten
//! with different entry order or compression while carrying identical
//! content. When the outer digests disagree, both containers are unpacked
//! into a private scratch directory and their contents compared file by
//! file. The scratch directory is removed when [`inspect`] returns, whether
//! it passed, failed or unwound.

use anyhow::{anyhow, Context, Result};
use std::{fs, io, path::Path, process::Command};
use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::{
    differ::{self, DiffEntry},
    lister::ArtifactTree,
    profile::ExtractorConfig,
    toolcheck,
};

pub trait ArchiveExtractor {
    /// Unpacks `archive` into the existing, empty directory `dest`.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;

    fn describe(&self) -> String;
}

/// Native extractor for zip-family containers (zip, jar, apk).
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = fs::File::open(archive)
            .with_context(|| format!("failed to open zip file: {}", archive.display()))?;
        let mut zip = ZipArchive::new(file)
            .with_context(|| format!("failed to read zip archive: {}", archive.display()))?;

        for idx in 0..zip.len() {
            let mut entry = zip.by_index(idx).with_context(|| {
                format!(
                    "failed to read zip entry index {idx} from {}",
                    archive.display()
                )
            })?;
            let Some(rel) = entry.enclosed_name() else {
                return Err(anyhow!(
                    "zip entry {:?} in {} escapes the extraction directory",
                    entry.name(),
                    archive.display()
                ));
            };
            let out = dest.join(rel);
            if entry.is_dir() {
                fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut f = fs::File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            io::copy(&mut entry, &mut f).with_context(|| {
                format!(
                    "failed to read zip entry {} from {}",
                    entry.name(),
                    archive.display()
                )
            })?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "zip".to_string()
    }
}

/// Runs an external extractor such as `jimage extract --dir {dest} {archive}`.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl ArchiveExtractor for CommandExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let archive_arg = archive.to_string_lossy();
        let dest_arg = dest.to_string_lossy();
        let args = toolcheck::expand_args(
            &self.args,
            &[("archive", &*archive_arg), ("dest", &*dest_arg)],
        );
        toolcheck::run_checked(Command::new(&self.program).args(&args), &self.program)
    }

    fn describe(&self) -> String {
        self.program.clone()
    }
}

pub fn from_profile(config: &ExtractorConfig) -> Box<dyn ArchiveExtractor> {
    match config {
        ExtractorConfig::Zip => Box::new(ZipExtractor),
        ExtractorConfig::Command { program, args } => {
            Box::new(CommandExtractor::new(program.clone(), args.clone()))
        }
    }
}

/// Which side of the comparison could not be unpacked.
#[derive(Debug, Error)]
#[error("extraction of {side} failed: {reason}")]
pub struct ExtractionFailure {
    pub side: &'static str,
    pub reason: String,
}

/// Contents of two containers compared after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// Files compared on each side.
    pub built_files: usize,
    pub official_files: usize,
    /// Non-matching entries in merge order.
    pub differing: Vec<DiffEntry>,
}

impl Inspection {
    pub fn diff_count(&self) -> usize {
        self.differing.len()
    }
}

/// Extracts both containers and diffs their contents.
///
/// An `Err` means the containers could not be compared at all; the caller
/// must treat that as a failure, never as a pass.
pub fn inspect(
    extractor: &dyn ArchiveExtractor,
    built: &Path,
    official: &Path,
) -> Result<Inspection, ExtractionFailure> {
    inspect_in(extractor, built, official, &std::env::temp_dir())
}

/// [`inspect`] with the scratch directory created under `scratch_parent`.
pub fn inspect_in(
    extractor: &dyn ArchiveExtractor,
    built: &Path,
    official: &Path,
    scratch_parent: &Path,
) -> Result<Inspection, ExtractionFailure> {
    let scratch = tempfile::Builder::new()
        .prefix("repcheck-inspect-")
        .tempdir_in(scratch_parent)
        .map_err(|e| ExtractionFailure {
            side: "scratch",
            reason: e.to_string(),
        })?;
    let built_dir = scratch.path().join("built");
    let official_dir = scratch.path().join("official");

    for (side, archive, dir) in [
        ("built", built, &built_dir),
        ("official", official, &official_dir),
    ] {
        fs::create_dir(dir)
            .map_err(anyhow::Error::from)
            .and_then(|()| extractor.extract(archive, dir))
            .map_err(|e| ExtractionFailure {
                side,
                reason: format!("{e:#}"),
            })?;
        debug!(side, archive = %archive.display(), via = %extractor.describe(), "extracted");
    }

    let listing = |side: &'static str, dir: &Path| {
        ArtifactTree::scan(side, dir).map_err(|e| ExtractionFailure {
            side,
            reason: format!("{e:#}"),
        })
    };
    let built_tree = listing("built", &built_dir)?;
    let official_tree = listing("official", &official_dir)?;

    let entries = differ::diff_trees(
        &built_tree,
        &official_tree,
        differ::digests_equal(&built_tree, &official_tree),
    )
    .map_err(|e| ExtractionFailure {
        side: "listing",
        reason: e.to_string(),
    })?;
    let differing = differ::differences(entries);

    info!(
        built = %built.display(),
        differing = differing.len(),
        "deep inspection complete"
    );
    Ok(Inspection {
        built_files: built_tree.len(),
        official_files: official_tree.len(),
        differing,
    })
}
