//! Path patterns for informational-only files.
//!
//! An excluded path is still counted and listed in the report, but it never
//! contributes to a tier failure. Patterns use the `regex` crate, so matching
//! is linear-time regardless of what a profile supplies.

use regex::Regex;

use crate::{differ::DiffEntry, error::InputError};

/// Anything inside a `legal/` directory at any depth.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[r"(^|/)legal/"];

/// Compiled regexes from one profile field. A path matches if any pattern
/// matches it.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile errors name `field` so the user knows which list to fix.
    pub fn compile<S: AsRef<str>>(field: &'static str, patterns: &[S]) -> Result<Self, InputError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|e| InputError::Profile {
                    field,
                    reason: format!("bad pattern {p:?}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|r| r.is_match(path))
    }
}

#[derive(Debug, Default)]
pub struct Partition {
    pub counted: Vec<DiffEntry>,
    pub excluded: Vec<DiffEntry>,
}

/// The profile's exclusion rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: PatternSet,
}

impl ExclusionSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, InputError> {
        Ok(Self {
            rules: PatternSet::compile("exclusions", patterns)?,
        })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.rules.matches(path)
    }

    /// Splits the non-matching entries of a diff. `Match` entries are
    /// dropped; relative order is preserved in both halves.
    pub fn partition(&self, entries: Vec<DiffEntry>) -> Partition {
        let mut out = Partition::default();
        for e in entries {
            if e.classification.is_match() {
                continue;
            }
            if self.is_excluded(&e.path) {
                out.excluded.push(e);
            } else {
                out.counted.push(e);
            }
        }
        out
    }
}
