//! Per-tier comparison results.

use serde::Serialize;
use std::fmt;

use crate::differ::DiffEntry;

/// Differing paths kept per tier for display.
pub const DISPLAY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    CriticalBinaries,
    Modules,
    Files,
}

impl TierName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CriticalBinaries => "critical_binaries",
            Self::Modules => "modules",
            Self::Files => "files",
        }
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tier. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonTierResult {
    name: TierName,
    passed: bool,
    diff_count: Option<usize>,
    differing_paths: Vec<String>,
    note: Option<String>,
}

impl ComparisonTierResult {
    /// Passes iff `diffs` is empty. Keeps the first [`DISPLAY_LIMIT`] paths
    /// in the order given.
    pub fn from_diffs(name: TierName, diffs: &[DiffEntry], note: Option<String>) -> Self {
        Self {
            name,
            passed: diffs.is_empty(),
            diff_count: Some(diffs.len()),
            differing_paths: diffs
                .iter()
                .take(DISPLAY_LIMIT)
                .map(|d| d.path.clone())
                .collect(),
            note,
        }
    }

    /// A tier that could not be fully compared. Always a failure.
    ///
    /// `diffs` are the differences found in the parts that could be
    /// compared; they are kept for display, but the total is unknown so
    /// `diff_count` is `None`.
    pub fn undecided(name: TierName, diffs: &[DiffEntry], note: impl Into<String>) -> Self {
        Self {
            passed: false,
            diff_count: None,
            note: Some(note.into()),
            ..Self::from_diffs(name, diffs, None)
        }
    }

    pub fn name(&self) -> TierName {
        self.name
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn diff_count(&self) -> Option<usize> {
        self.diff_count
    }

    pub fn differing_paths(&self) -> &[String] {
        &self.differing_paths
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::differ::Classification;

    fn entries(n: usize) -> Vec<DiffEntry> {
        (0..n)
            .map(|i| DiffEntry {
                path: format!("f{i:03}"),
                classification: Classification::ContentDiffers,
            })
            .collect()
    }

    #[test]
    fn test_empty_diff_passes() {
        let r = ComparisonTierResult::from_diffs(TierName::Files, &[], None);
        assert!(r.passed());
        assert_eq!(r.diff_count(), Some(0));
        assert!(r.differing_paths().is_empty());
    }

    #[test]
    fn test_display_list_is_capped_but_count_is_not() {
        let r = ComparisonTierResult::from_diffs(TierName::Modules, &entries(25), None);
        assert!(!r.passed());
        assert_eq!(r.diff_count(), Some(25));
        assert_eq!(r.differing_paths().len(), DISPLAY_LIMIT);
        assert_eq!(r.differing_paths().first().unwrap(), "f000");
        assert_eq!(r.differing_paths().last().unwrap(), "f019");
    }

    #[test]
    fn test_undecided_fails_without_count() {
        let r = ComparisonTierResult::undecided(TierName::Modules, &[], "extraction failed");
        assert!(!r.passed());
        assert_eq!(r.diff_count(), None);
        assert_eq!(r.note(), Some("extraction failed"));
    }

    #[test]
    fn test_undecided_keeps_known_differences() {
        let r = ComparisonTierResult::undecided(TierName::Modules, &entries(25), "partial");
        assert!(!r.passed());
        assert_eq!(r.diff_count(), None);
        assert_eq!(r.differing_paths().len(), DISPLAY_LIMIT);
        assert_eq!(r.differing_paths().first().unwrap(), "f000");
    }

    #[test]
    fn test_tier_names_match_report_keys() {
        assert_eq!(TierName::CriticalBinaries.to_string(), "critical_binaries");
        assert_eq!(
            serde_json::to_value(TierName::Files).unwrap(),
            serde_json::json!("files")
        );
    }
}
