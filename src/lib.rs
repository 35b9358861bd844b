//! # repcheck -- reproducible-build verdicts
//!
//! Compares a locally built artifact tree against an official release and
//! decides whether the build reproduced it.
//!
//! A single whole-archive hash is a poor judge: archives embed timestamps,
//! container images get repacked, and release binaries are signed after the
//! build. repcheck therefore compares in tiers, each of which tolerates one
//! class of benign difference, and reports every tier's findings next to the
//! raw archive hashes.
//!
//! ## Tiers
//!
//! 1. **Critical binaries** -- exact digest of each named executable or
//!    library, after stripping detachable signatures.
//! 2. **Modules** -- container files (jars, `modules` images) whose outer
//!    digest differs are unpacked and compared entry by entry.
//! 3. **File set** -- the whole tree, minus informational paths such as
//!    `legal/`, must match in structure and content.
//!
//! The run is reproducible iff every evaluated tier passed.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`fs_guard`] | Symlink-safe, size-bounded file reads |
//! | [`hasher`] | Streaming SHA-256 digests |
//! | [`lister`] | Sorted, lazily hashed artifact tree listings |
//! | [`differ`] | Merge-join tree classification |
//! | [`exclusion`] | Informational-path patterns |
//! | [`signature`] | Authenticode stripping |
//! | [`inspect`] | Container extraction and deep comparison |
//! | [`tier`] | Per-tier results |
//! | [`verdict`] | Tier aggregation |
//! | [`report`] | YAML/JSON verdict records |
//! | [`profile`] | Per-target configuration |
//! | [`engine`] | The end-to-end comparison pipeline |

#![forbid(unsafe_code)]

/// Typed errors that select the process exit code.
pub mod error;

/// Exit codes and their mapping from errors.
pub mod exit;

/// Symlink-safe, size-bounded file reads.
pub mod fs_guard;

pub mod hasher;

/// Recursive listing of an artifact root into a sorted, deduplicated set of
/// relative paths with lazily computed digests.
pub mod lister;

pub mod differ;

pub mod exclusion;

pub mod signature;

pub mod inspect;

pub mod tier;

pub mod verdict;

pub mod report;

/// Target profiles: which files are critical, which are containers, which
/// are signed, and how to unpack and unsign them.
pub mod profile;

/// External program invocation and availability checks.
pub mod toolcheck;

pub mod engine;

pub use engine::{Engine, Roots};
pub use profile::TargetProfile;
pub use report::{Format, VerdictRecord};
pub use verdict::Status;
