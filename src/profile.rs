//! Per-target configuration loaded from a JSON profile.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Component, Path},
};

use crate::{error::InputError, exclusion::DEFAULT_EXCLUSIONS};

/// Maximum profile file size (1 MB).
const MAX_PROFILE_BYTES: u64 = 1024 * 1024;

/// How container files are unpacked for deep inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// Native zip/jar extraction.
    #[default]
    Zip,
    /// External program, e.g. `jimage extract --dir {dest} {archive}`.
    Command { program: String, args: Vec<String> },
}

/// External signature remover, e.g.
/// `osslsigncode remove-signature -in {input} -out {output}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Everything that differs between build targets. One profile per
/// application/platform pair; the comparison engine itself is shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetProfile {
    pub name: String,
    pub build_type: String,
    pub architecture: String,
    pub artifacts: Vec<String>,
    pub critical_files: Vec<String>,
    pub container_files: Vec<String>,
    pub signed_files: Vec<String>,
    pub exclusions: Vec<String>,
    pub extractor: ExtractorConfig,
    pub signature_tool: Option<ToolCommand>,
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            build_type: "tarball".to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            artifacts: Vec::new(),
            critical_files: Vec::new(),
            container_files: Vec::new(),
            signed_files: Vec::new(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(ToString::to_string).collect(),
            extractor: ExtractorConfig::default(),
            signature_tool: None,
        }
    }
}

impl TargetProfile {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let profile: Self = match path {
            Some(p) => {
                let bytes = crate::fs_guard::read_validated(p, MAX_PROFILE_BYTES).map_err(|e| {
                    InputError::Profile {
                        field: "<file>",
                        reason: format!("{e:#}"),
                    }
                })?;
                serde_json::from_slice(&bytes)
                    .map_err(|e| InputError::Profile {
                        field: "<file>",
                        reason: e.to_string(),
                    })
                    .with_context(|| format!("loading profile {}", p.display()))?
            }
            None => Self::default(),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Rejects entries that could never name a file inside an artifact root.
    pub fn validate(&self) -> Result<(), InputError> {
        check_rel_paths("artifacts", &self.artifacts)?;
        check_rel_paths("critical_files", &self.critical_files)?;
        check_rel_paths("container_files", &self.container_files)?;

        if let ExtractorConfig::Command { program, args } = &self.extractor {
            check_tool("extractor", program, args, &["{archive}", "{dest}"])?;
        }
        if let Some(tool) = &self.signature_tool {
            check_tool("signature_tool", &tool.program, &tool.args, &["{input}", "{output}"])?;
        }
        Ok(())
    }

    /// Programs this profile shells out to.
    pub fn external_programs(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let ExtractorConfig::Command { program, .. } = &self.extractor {
            out.push(program.as_str());
        }
        if let Some(tool) = &self.signature_tool {
            out.push(tool.program.as_str());
        }
        out
    }
}

fn check_rel_paths(field: &'static str, paths: &[String]) -> Result<(), InputError> {
    let mut seen = BTreeSet::new();
    for p in paths {
        let bad = |reason: &str| InputError::Profile {
            field,
            reason: format!("{p:?}: {reason}"),
        };
        if p.trim().is_empty() {
            return Err(bad("empty path"));
        }
        if p.contains('\\') {
            return Err(bad("use '/' as the separator"));
        }
        let path = Path::new(p);
        if path.is_absolute() || p.starts_with('/') {
            return Err(bad("must be relative to the artifact root"));
        }
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(bad("must not contain '..'"));
        }
        if !seen.insert(p.as_str()) {
            return Err(bad("listed twice"));
        }
    }
    Ok(())
}

fn check_tool(
    field: &'static str,
    program: &str,
    args: &[String],
    placeholders: &[&str],
) -> Result<(), InputError> {
    if program.trim().is_empty() {
        return Err(InputError::Profile {
            field,
            reason: "program is empty".to_string(),
        });
    }
    for ph in placeholders {
        if !args.iter().any(|a| a.contains(ph)) {
            return Err(InputError::Profile {
                field,
                reason: format!("args must reference {ph}"),
            });
        }
    }
    Ok(())
}
