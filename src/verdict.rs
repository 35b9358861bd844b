//! Tier aggregation.
//!
//! Tiers are recorded in a fixed order: critical binaries, modules, file
//! set. Every tier is always offered to the aggregator, even after an
//! earlier one failed, so the report carries every finding. A tier may be
//! recorded as not evaluated (`None`) when the profile gives it nothing to
//! compare.
//!
//! The run is reproducible iff every evaluated tier passed. The
//! whole-artifact hash comparison is reported next to that result but only
//! decides the verdict when no tier was evaluated at all.

use serde::Serialize;

use crate::{
    error::InvariantViolation,
    report::FileRecord,
    tier::{ComparisonTierResult, TierName},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Reproducible,
    NotReproducible,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reproducible => "reproducible",
            Self::NotReproducible => "not_reproducible",
        }
    }

    pub fn is_reproducible(self) -> bool {
        self == Self::Reproducible
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pending,
    CriticalChecked,
    ModulesChecked,
    FilesetChecked,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CriticalChecked => "critical_checked",
            Self::ModulesChecked => "modules_checked",
            Self::FilesetChecked => "fileset_checked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub tiers: Vec<ComparisonTierResult>,
    pub notes: String,
}

#[derive(Debug)]
pub struct VerdictAggregator {
    stage: Stage,
    tiers: Vec<ComparisonTierResult>,
    skipped: Vec<TierName>,
}

impl Default for VerdictAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl VerdictAggregator {
    pub fn new() -> Self {
        Self {
            stage: Stage::Pending,
            tiers: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn record_critical(
        &mut self,
        result: Option<ComparisonTierResult>,
    ) -> Result<(), InvariantViolation> {
        self.advance(
            Stage::Pending,
            Stage::CriticalChecked,
            TierName::CriticalBinaries,
            result,
        )
    }

    pub fn record_modules(
        &mut self,
        result: Option<ComparisonTierResult>,
    ) -> Result<(), InvariantViolation> {
        self.advance(
            Stage::CriticalChecked,
            Stage::ModulesChecked,
            TierName::Modules,
            result,
        )
    }

    pub fn record_fileset(
        &mut self,
        result: Option<ComparisonTierResult>,
    ) -> Result<(), InvariantViolation> {
        self.advance(
            Stage::ModulesChecked,
            Stage::FilesetChecked,
            TierName::Files,
            result,
        )
    }

    fn advance(
        &mut self,
        expected: Stage,
        next: Stage,
        tier: TierName,
        result: Option<ComparisonTierResult>,
    ) -> Result<(), InvariantViolation> {
        if self.stage != expected {
            return Err(InvariantViolation::StageOrder {
                expected: expected.as_str(),
                found: self.stage.as_str(),
            });
        }
        match result {
            Some(r) if r.name() != tier => {
                return Err(InvariantViolation::StageOrder {
                    expected: tier.as_str(),
                    found: r.name().as_str(),
                })
            }
            Some(r) => self.tiers.push(r),
            None => self.skipped.push(tier),
        }
        self.stage = next;
        Ok(())
    }

    /// Combines the recorded tiers with the whole-artifact comparison.
    pub fn finalize(self, artifacts: &[FileRecord]) -> Result<Verdict, InvariantViolation> {
        if self.stage != Stage::FilesetChecked {
            return Err(InvariantViolation::StageOrder {
                expected: Stage::FilesetChecked.as_str(),
                found: self.stage.as_str(),
            });
        }

        let artifacts_match = if artifacts.is_empty() {
            None
        } else {
            Some(artifacts.iter().all(|f| f.matched))
        };

        let mut flags = Vec::new();
        for name in [TierName::CriticalBinaries, TierName::Modules, TierName::Files] {
            let flag = match self.tiers.iter().find(|t| t.name() == name) {
                Some(t) => t.passed().to_string(),
                None => "skipped".to_string(),
            };
            flags.push(format!("{name}={flag}"));
        }
        if let Some(m) = artifacts_match {
            flags.push(format!(
                "artifact_hash={}",
                if m { "match" } else { "mismatch" }
            ));
        }

        let mut details: Vec<String> = self
            .tiers
            .iter()
            .filter_map(|t| t.note().map(|n| format!("{}: {n}", t.name())))
            .collect();

        let status = if self.tiers.is_empty() {
            match artifacts_match {
                Some(true) => {
                    details.push("no tier evaluated; verdict from whole-artifact hash".to_string());
                    Status::Reproducible
                }
                Some(false) => Status::NotReproducible,
                None => {
                    details.push("nothing was compared; cannot establish reproducibility".to_string());
                    Status::NotReproducible
                }
            }
        } else {
            let tiered = if self.tiers.iter().all(ComparisonTierResult::passed) {
                Status::Reproducible
            } else {
                Status::NotReproducible
            };
            match (tiered, artifacts_match) {
                (Status::Reproducible, Some(false)) => details.push(
                    "whole-artifact hash differs but all tiers passed; tiered verdict is authoritative"
                        .to_string(),
                ),
                (Status::NotReproducible, Some(true)) => details.push(
                    "whole-artifact hash matches but a tier failed; tiered verdict is authoritative"
                        .to_string(),
                ),
                _ => {}
            }
            tiered
        };

        let mut notes = flags.join(" ");
        if !details.is_empty() {
            notes.push_str("; ");
            notes.push_str(&details.join("; "));
        }

        Ok(Verdict {
            status,
            tiers: self.tiers,
            notes,
        })
    }
}
