//! The comparison pipeline.
//!
//! One [`Engine`] per profile; one call to [`Engine::run`] per comparison.
//! Input problems (missing roots, bad listings) abort before any tier runs.
//! After that point every failure is local to its tier: the run always ends
//! with a [`VerdictRecord`].

use anyhow::{Context, Result};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::{
    differ::{self, Classification, DiffEntry},
    exclusion::{ExclusionSet, PatternSet},
    hasher,
    inspect::{self, ArchiveExtractor},
    lister::ArtifactTree,
    profile::TargetProfile,
    report::{BuildTags, ExcludedPaths, FileRecord, VerdictRecord},
    signature::{self, SignatureStripper},
    tier::{ComparisonTierResult, TierName},
    verdict::VerdictAggregator,
};

/// Where the two sides of a comparison live.
#[derive(Debug, Clone)]
pub struct Roots {
    pub built: PathBuf,
    pub official: PathBuf,
    /// Directories holding the whole-artifact files named by the profile.
    pub built_artifacts: PathBuf,
    pub official_artifacts: PathBuf,
}

impl Roots {
    /// Artifact files live in the tree roots themselves.
    pub fn new(built: impl Into<PathBuf>, official: impl Into<PathBuf>) -> Self {
        let built = built.into();
        let official = official.into();
        Self {
            built_artifacts: built.clone(),
            official_artifacts: official.clone(),
            built,
            official,
        }
    }
}

pub struct Engine {
    profile: TargetProfile,
    exclusions: ExclusionSet,
    signed: PatternSet,
    stripper: Box<dyn SignatureStripper>,
    extractor: Box<dyn ArchiveExtractor>,
}

/// Per-run state shared by the tier checks.
struct Run<'a> {
    built: &'a ArtifactTree,
    official: &'a ArtifactTree,
    warnings: Vec<String>,
}

impl Engine {
    pub fn new(profile: TargetProfile) -> Result<Self> {
        profile.validate()?;
        let exclusions = ExclusionSet::compile(&profile.exclusions)?;
        let signed = PatternSet::compile("signed_files", &profile.signed_files)?;
        let stripper = signature::from_profile(profile.signature_tool.as_ref());
        let extractor = inspect::from_profile(&profile.extractor);
        Ok(Self {
            profile,
            exclusions,
            signed,
            stripper,
            extractor,
        })
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn with_stripper(mut self, stripper: Box<dyn SignatureStripper>) -> Self {
        self.stripper = stripper;
        self
    }

    pub fn run(&self, roots: &Roots) -> Result<VerdictRecord> {
        let built = ArtifactTree::scan("built", &roots.built)?;
        let official = ArtifactTree::scan("official", &roots.official)?;
        info!(
            profile = %self.profile.name,
            built_files = built.len(),
            official_files = official.len(),
            "listed artifact trees"
        );

        let mut run = Run {
            built: &built,
            official: &official,
            warnings: Vec::new(),
        };

        let mut agg = VerdictAggregator::new();
        agg.record_critical(self.check_critical(&mut run))?;
        agg.record_modules(self.check_modules(&mut run))?;
        let (files_tier, excluded) = self.check_fileset(&mut run)?;
        agg.record_fileset(Some(files_tier))?;

        let artifacts = self.compare_artifacts(roots);
        let verdict = agg.finalize(&artifacts)?;
        info!(status = verdict.status.as_str(), notes = %verdict.notes, "verdict");

        VerdictRecord::new(
            BuildTags {
                profile: self.profile.name.clone(),
                build_type: self.profile.build_type.clone(),
                architecture: self.profile.architecture.clone(),
            },
            artifacts,
            verdict,
            ExcludedPaths::new(excluded.iter().map(|e| e.path.as_str())),
            run.warnings,
        )
    }

    /// Digest used for equality: signature-normalized for signed files,
    /// raw content otherwise. `None` when the file cannot be read.
    fn digest(&self, tree: &ArtifactTree, rel: &str, warnings: &mut Vec<String>) -> Option<String> {
        let entry = tree.entry(rel)?;
        if !self.signed.matches(rel) {
            return entry.digest().map(ToString::to_string);
        }
        let path = tree.root().join(rel);
        match signature::normalize(self.stripper.as_ref(), &path) {
            Ok(n) => {
                if let Some(w) = n.warning {
                    warnings.push(w);
                }
                Some(hasher::sha256_bytes(&n.bytes))
            }
            Err(e) => {
                debug!(path = %path.display(), error = %format!("{e:#}"), "unreadable signed file");
                None
            }
        }
    }

    fn check_critical(&self, run: &mut Run<'_>) -> Option<ComparisonTierResult> {
        if self.profile.critical_files.is_empty() {
            return None;
        }
        let mut diffs = Vec::new();
        let mut missing = Vec::new();
        for rel in &self.profile.critical_files {
            let b = self.digest(run.built, rel, &mut run.warnings);
            let o = self.digest(run.official, rel, &mut run.warnings);
            let classification = match (&b, &o) {
                (Some(x), Some(y)) if x == y => continue,
                (Some(_), Some(_)) => Classification::ContentDiffers,
                (None, Some(_)) => Classification::MissingInA,
                (Some(_), None) => Classification::MissingInB,
                (None, None) => Classification::MissingInA,
            };
            if b.is_none() || o.is_none() {
                missing.push(rel.as_str());
            }
            debug!(path = %rel, ?classification, "critical file differs");
            diffs.push(DiffEntry {
                path: rel.clone(),
                classification,
            });
        }
        let note = (!missing.is_empty()).then(|| format!("no digest for {}", missing.join(", ")));
        Some(ComparisonTierResult::from_diffs(
            TierName::CriticalBinaries,
            &diffs,
            note,
        ))
    }

    fn check_modules(&self, run: &mut Run<'_>) -> Option<ComparisonTierResult> {
        if self.profile.container_files.is_empty() {
            return None;
        }
        let mut diffs = Vec::new();
        let mut notes = Vec::new();
        let mut undecided = Vec::new();

        for rel in &self.profile.container_files {
            let b = run.built.entry(rel).and_then(|e| e.digest());
            let o = run.official.entry(rel).and_then(|e| e.digest());
            match (b, o) {
                (Some(x), Some(y)) if x == y => continue,
                (None, _) | (_, None) => {
                    notes.push(format!("{rel} has no digest on one side"));
                    diffs.push(DiffEntry {
                        path: rel.clone(),
                        classification: if b.is_none() {
                            Classification::MissingInA
                        } else {
                            Classification::MissingInB
                        },
                    });
                    continue;
                }
                _ => {}
            }

            info!(container = %rel, "top-level hash differs; inspecting contents");
            match inspect::inspect(
                self.extractor.as_ref(),
                &run.built.root().join(rel),
                &run.official.root().join(rel),
            ) {
                Ok(inspection) if inspection.diff_count() == 0 => {
                    notes.push(format!(
                        "{rel} raw hash mismatch, contents identical ({} files)",
                        inspection.built_files
                    ));
                    run.warnings
                        .push(format!("{rel}: raw hash mismatch tolerated by deep inspection"));
                }
                Ok(inspection) => {
                    notes.push(format!(
                        "{rel} raw hash mismatch, {} differing entries",
                        inspection.diff_count()
                    ));
                    diffs.extend(inspection.differing.into_iter().map(|d| DiffEntry {
                        path: format!("{rel}!/{}", d.path),
                        classification: d.classification,
                    }));
                }
                Err(failure) => {
                    warn!(container = %rel, %failure, "deep inspection failed");
                    undecided.push(format!("{rel}: {failure}"));
                }
            }
        }

        if !undecided.is_empty() {
            notes.extend(undecided);
            return Some(ComparisonTierResult::undecided(
                TierName::Modules,
                &diffs,
                notes.join("; "),
            ));
        }
        let note = (!notes.is_empty()).then(|| notes.join("; "));
        Some(ComparisonTierResult::from_diffs(TierName::Modules, &diffs, note))
    }

    /// Returns the tier and the excluded differences (reported, never
    /// counted).
    fn check_fileset(&self, run: &mut Run<'_>) -> Result<(ComparisonTierResult, Vec<DiffEntry>)> {
        // Content of these paths is judged by the tier that owns them.
        let delegated: BTreeSet<&str> = self
            .profile
            .critical_files
            .iter()
            .chain(&self.profile.container_files)
            .map(String::as_str)
            .collect();

        let (built, official) = (run.built, run.official);
        let warnings = &mut run.warnings;
        let entries = differ::diff_trees(built, official, |rel| {
            if delegated.contains(rel) {
                return true;
            }
            let b = self.digest(built, rel, warnings);
            let o = self.digest(official, rel, warnings);
            matches!((b, o), (Some(x), Some(y)) if x == y)
        })
        .context("diffing artifact trees")?;

        let partition = self.exclusions.partition(entries);
        let mut note = Vec::new();
        if built.len() != official.len() {
            note.push(format!(
                "file count built={} official={}",
                built.len(),
                official.len()
            ));
        }
        if !partition.excluded.is_empty() {
            let shown: Vec<&str> = partition
                .excluded
                .iter()
                .take(5)
                .map(|e| e.path.as_str())
                .collect();
            note.push(format!(
                "excluded_delta={} ({}{})",
                partition.excluded.len(),
                shown.join(", "),
                if partition.excluded.len() > shown.len() { ", ..." } else { "" }
            ));
        }
        let note = (!note.is_empty()).then(|| note.join(", "));
        let tier = ComparisonTierResult::from_diffs(TierName::Files, &partition.counted, note);
        Ok((tier, partition.excluded))
    }

    fn compare_artifacts(&self, roots: &Roots) -> Vec<FileRecord> {
        self.profile
            .artifacts
            .iter()
            .map(|name| {
                let hash = hasher::try_sha256(&artifact_path(&roots.built_artifacts, name));
                let official_hash =
                    hasher::try_sha256(&artifact_path(&roots.official_artifacts, name));
                let matched = matches!((&hash, &official_hash), (Some(a), Some(b)) if a == b);
                FileRecord {
                    filename: name.clone(),
                    hash,
                    official_hash,
                    matched,
                }
            })
            .collect()
    }
}

fn artifact_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}
