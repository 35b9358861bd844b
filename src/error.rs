//! Typed errors that must survive to the process boundary.
//!
//! Most of repcheck propagates `anyhow::Error` with context. The two kinds
//! below are the exceptions: `main` walks the error chain looking for them to
//! choose an exit code, so they are concrete types rather than strings.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with what the caller handed us. Raised before any tier runs;
/// there is nothing to aggregate, so no verdict is produced.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("artifact root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("artifact root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cannot read artifact root {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("invalid profile entry in `{field}`: {reason}")]
    Profile { field: &'static str, reason: String },

    #[error("limit exceeded: {0}")]
    Limit(String),
}

/// Broken upstream guarantees. These indicate a bug in the lister (or
/// whatever produced the listing) and are never tolerated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("{side} listing is not sorted: {prev:?} precedes {next:?}")]
    Unsorted {
        side: &'static str,
        prev: String,
        next: String,
    },

    #[error("{side} listing contains duplicate path {path:?}")]
    Duplicate { side: &'static str, path: String },

    #[error("verdict stage out of order: expected {expected}, found {found}")]
    StageOrder {
        expected: &'static str,
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_messages_name_the_path() {
        let err = InputError::MissingRoot(PathBuf::from("/nope/built"));
        assert!(err.to_string().contains("/nope/built"));

        let err = InputError::Profile {
            field: "critical_files",
            reason: "absolute path".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid profile entry in `critical_files`: absolute path"
        );
    }

    #[test]
    fn test_invariant_violation_is_found_through_anyhow_chain() {
        let err = anyhow::Error::new(InvariantViolation::Duplicate {
            side: "built",
            path: "a.txt".to_string(),
        })
        .context("diffing trees");
        assert!(err
            .chain()
            .any(|c| c.downcast_ref::<InvariantViolation>().is_some()));
    }
}
