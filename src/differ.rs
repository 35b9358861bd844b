//! Sorted merge-join of two path listings.
//!
//! [`diff`] is purely structural: it decides which paths exist on which side.
//! [`diff_trees`] layers content equality on top by asking the caller about
//! every path present on both sides.

use serde::Serialize;
use std::cmp::Ordering;

use crate::{error::InvariantViolation, lister::ArtifactTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Match,
    ContentDiffers,
    /// Present in B only.
    MissingInA,
    /// Present in A only.
    MissingInB,
}

impl Classification {
    pub fn is_match(self) -> bool {
        self == Self::Match
    }

    /// The classification seen from the other side of the comparison.
    pub fn swapped(self) -> Self {
        match self {
            Self::MissingInA => Self::MissingInB,
            Self::MissingInB => Self::MissingInA,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub path: String,
    pub classification: Classification,
}

impl DiffEntry {
    fn new(path: &str, classification: Classification) -> Self {
        Self {
            path: path.to_string(),
            classification,
        }
    }
}

fn as_str<S: AsRef<str>>(s: &S) -> &str {
    s.as_ref()
}

fn check_sorted<S: AsRef<str>>(side: &'static str, list: &[S]) -> Result<(), InvariantViolation> {
    for pair in list.windows(2) {
        let [prev, next] = pair else { continue };
        let (prev, next) = (as_str(prev), as_str(next));
        match prev.cmp(next) {
            Ordering::Less => {}
            Ordering::Equal => {
                return Err(InvariantViolation::Duplicate {
                    side,
                    path: prev.to_string(),
                })
            }
            Ordering::Greater => {
                return Err(InvariantViolation::Unsorted {
                    side,
                    prev: prev.to_string(),
                    next: next.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Classifies every path of two strictly ascending listings in O(n + m).
///
/// Equal heads are reported as [`Classification::Match`]; content is not
/// inspected here. Unsorted or duplicated input is rejected rather than
/// producing a silently wrong classification.
pub fn diff<S: AsRef<str>, T: AsRef<str>>(
    a: &[S],
    b: &[T],
) -> Result<Vec<DiffEntry>, InvariantViolation> {
    check_sorted("A", a)?;
    check_sorted("B", b)?;

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let mut ia = a.iter().map(as_str).peekable();
    let mut ib = b.iter().map(as_str).peekable();

    loop {
        let heads = (ia.peek().copied(), ib.peek().copied());
        match heads {
            (None, None) => break,
            (Some(pa), None) => {
                out.push(DiffEntry::new(pa, Classification::MissingInB));
                ia.next();
            }
            (None, Some(pb)) => {
                out.push(DiffEntry::new(pb, Classification::MissingInA));
                ib.next();
            }
            (Some(pa), Some(pb)) => match pa.cmp(pb) {
                Ordering::Equal => {
                    out.push(DiffEntry::new(pa, Classification::Match));
                    ia.next();
                    ib.next();
                }
                Ordering::Less => {
                    out.push(DiffEntry::new(pa, Classification::MissingInB));
                    ia.next();
                }
                Ordering::Greater => {
                    out.push(DiffEntry::new(pb, Classification::MissingInA));
                    ib.next();
                }
            },
        }
    }
    Ok(out)
}

/// Diffs two trees and downgrades structural matches whose content differs.
///
/// `same_content` is called once per path present in both trees, in merge
/// order; every hashing call completes before the result is returned.
pub fn diff_trees(
    a: &ArtifactTree,
    b: &ArtifactTree,
    mut same_content: impl FnMut(&str) -> bool,
) -> Result<Vec<DiffEntry>, InvariantViolation> {
    let mut entries = diff(a.entries(), b.entries())?;
    for e in &mut entries {
        if e.classification.is_match() && !same_content(&e.path) {
            e.classification = Classification::ContentDiffers;
        }
    }
    Ok(entries)
}

/// Content comparator for [`diff_trees`] backed by each tree's lazily cached
/// digests. A path without a digest on either side counts as differing.
pub fn digests_equal<'t>(a: &'t ArtifactTree, b: &'t ArtifactTree) -> impl FnMut(&str) -> bool + 't {
    move |path| {
        let da = a.entry(path).and_then(|e| e.digest());
        let db = b.entry(path).and_then(|e| e.digest());
        matches!((da, db), (Some(x), Some(y)) if x == y)
    }
}

/// Drops `Match` entries, keeping merge order.
pub fn differences(entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
    entries
        .into_iter()
        .filter(|e| !e.classification.is_match())
        .collect()
}
