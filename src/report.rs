//! Structured verdict records.
//!
//! Field order is the declaration order below, and every list is either
//! sorted or in merge-join encounter order, so two runs over the same inputs
//! render byte-identical reports apart from `date`.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::{fs, path::Path};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    tier::{ComparisonTierResult, DISPLAY_LIMIT},
    verdict::{Status, Verdict},
};

/// Whole-artifact hash comparison for one shipped file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub filename: String,
    pub hash: Option<String>,
    pub official_hash: Option<String>,
    #[serde(rename = "match")]
    pub matched: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExcludedPaths {
    pub count: usize,
    pub paths: Vec<String>,
}

impl ExcludedPaths {
    pub fn new<'a>(all: impl IntoIterator<Item = &'a str>) -> Self {
        let mut count = 0;
        let mut paths = Vec::new();
        for p in all {
            if paths.len() < DISPLAY_LIMIT {
                paths.push(p.to_string());
            }
            count += 1;
        }
        Self { count, paths }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerdictRecord {
    pub date: String,
    pub script_version: String,
    pub profile: String,
    pub build_type: String,
    pub architecture: String,
    pub files: Vec<FileRecord>,
    pub status: Status,
    pub notes: String,
    pub tiers: Vec<ComparisonTierResult>,
    pub excluded_paths: ExcludedPaths,
    pub warnings: Vec<String>,
}

/// Pass-through tags describing the build.
#[derive(Debug, Clone)]
pub struct BuildTags {
    pub profile: String,
    pub build_type: String,
    pub architecture: String,
}

impl VerdictRecord {
    pub fn new(
        tags: BuildTags,
        mut files: Vec<FileRecord>,
        verdict: Verdict,
        excluded_paths: ExcludedPaths,
        warnings: Vec<String>,
    ) -> Result<Self> {
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(Self {
            date: OffsetDateTime::now_utc().format(&Rfc3339)?,
            script_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: tags.profile,
            build_type: tags.build_type,
            architecture: tags.architecture,
            files,
            status: verdict.status,
            notes: verdict.notes,
            tiers: verdict.tiers,
            excluded_paths,
            warnings,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Yaml,
    Json,
}

pub fn render(record: &VerdictRecord, format: Format) -> Result<String> {
    Ok(match format {
        Format::Yaml => serde_yaml::to_string(record).context("rendering YAML report")?,
        Format::Json => {
            let mut s = serde_json::to_string_pretty(record).context("rendering JSON report")?;
            s.push('\n');
            s
        }
    })
}

pub fn write_report(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    fs::write(path, rendered).with_context(|| format!("writing report {}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::tier::TierName;

    fn sample() -> VerdictRecord {
        let verdict = Verdict {
            status: Status::Reproducible,
            tiers: vec![ComparisonTierResult::from_diffs(TierName::Files, &[], None)],
            notes: "critical_binaries=skipped modules=skipped files=true".to_string(),
        };
        VerdictRecord::new(
            BuildTags {
                profile: "default".to_string(),
                build_type: "tarball".to_string(),
                architecture: "x86_64".to_string(),
            },
            vec![
                FileRecord {
                    filename: "z.tar.gz".to_string(),
                    hash: Some("11".to_string()),
                    official_hash: Some("11".to_string()),
                    matched: true,
                },
                FileRecord {
                    filename: "a.deb".to_string(),
                    hash: None,
                    official_hash: Some("22".to_string()),
                    matched: false,
                },
            ],
            verdict,
            ExcludedPaths::new(["legal/LICENSE"]),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_yaml_keeps_wire_names_and_order() {
        let yaml = render(&sample(), Format::Yaml).unwrap();
        let keys: Vec<&str> = yaml
            .lines()
            .filter(|l| !l.starts_with(' ') && !l.starts_with('-') && l.contains(':'))
            .map(|l| l.split(':').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            [
                "date",
                "script_version",
                "profile",
                "build_type",
                "architecture",
                "files",
                "status",
                "notes",
                "tiers",
                "excluded_paths",
                "warnings"
            ]
        );
        assert!(yaml.contains("status: reproducible"));
        assert!(yaml.contains("match: true"));
    }

    #[test]
    fn test_files_sorted_by_filename() {
        let r = sample();
        assert_eq!(r.files[0].filename, "a.deb");
        assert_eq!(r.files[1].filename, "z.tar.gz");
    }

    #[test]
    fn test_json_round_trips_through_value() {
        let json = render(&sample(), Format::Json).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["status"], "reproducible");
        assert_eq!(v["files"][0]["match"], false);
        assert!(v["files"][0]["hash"].is_null());
        assert_eq!(v["excluded_paths"]["count"], 1);
        assert_eq!(v["script_version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_rendering_is_stable() {
        let r = sample();
        assert_eq!(
            render(&r, Format::Yaml).unwrap(),
            render(&r, Format::Yaml).unwrap()
        );
    }

    #[test]
    fn test_excluded_paths_capped() {
        let names: Vec<String> = (0..30).map(|i| format!("legal/{i:02}")).collect();
        let e = ExcludedPaths::new(names.iter().map(String::as_str));
        assert_eq!(e.count, 30);
        assert_eq!(e.paths.len(), DISPLAY_LIMIT);
    }

    #[test]
    fn test_write_report_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out/nested/report.yaml");
        write_report(&p, "status: reproducible\n").unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "status: reproducible\n");
    }
}
