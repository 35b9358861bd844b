//! External helper programs.
//!
//! Container extraction and signature removal may be delegated to programs
//! such as `jimage` or `osslsigncode`. This module runs them without a shell,
//! expands the `{placeholder}` arguments a profile declares, keeps their
//! stderr short and free of secrets before it reaches a report, and probes
//! `$PATH` so `repcheck tools` can say up front what is missing.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::process::{Command, Stdio};

const MAX_TOOL_ERR_BYTES: usize = 8 * 1024; // 8KB

/// Runs an external tool, returning an error with sanitized stderr on failure.
pub fn run_checked(cmd: &mut Command, name: &str) -> Result<()> {
    let out = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("running {name}"))?;
    if !out.status.success() {
        return Err(anyhow!(
            "{name} failed ({}): {}",
            out.status,
            sanitize_tool_stderr(&out.stderr)
        ));
    }
    Ok(())
}

/// Substitutes `{key}` occurrences in each argument.
pub fn expand_args(args: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    args.iter()
        .map(|a| {
            vars.iter()
                .fold(a.clone(), |acc, (k, v)| acc.replace(&format!("{{{k}}}"), v))
        })
        .collect()
}

pub fn sanitize_tool_stderr(stderr: &[u8]) -> String {
    let mut s = String::from_utf8_lossy(stderr).to_string();
    if s.len() > MAX_TOOL_ERR_BYTES {
        let mut cut = MAX_TOOL_ERR_BYTES;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("\n[TRUNCATED]");
    }

    // Build hosts sometimes echo credentials from the environment.
    let patterns = [
        (r"AKIA[0-9A-Z]{16}", "AKIA****************"),
        (r"(?i)ghp_[A-Za-z0-9]{30,60}", "ghp_****************"),
        (
            r"(?i)(password|token|passphrase)\s*[:=]\s*[^\s]+",
            "[REDACTED]=[REDACTED]",
        ),
        (r"(?i)bearer\s+[a-z0-9\-_\.=]{1,500}", "bearer [REDACTED]"),
    ];
    for (pat, repl) in patterns {
        if let Ok(re) = Regex::new(pat) {
            s = re.replace_all(&s, repl).to_string();
        }
    }
    s.trim().to_string()
}

/// Availability of each external program a profile names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolAvailability {
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

impl ToolAvailability {
    pub fn all_available(&self) -> bool {
        self.missing.is_empty()
    }

    /// One line per missing program with an install hint when we know one.
    pub fn missing_tools_report(&self) -> Vec<String> {
        self.missing
            .iter()
            .map(|tool| match tool.as_str() {
                "jimage" => "jimage: not found. It ships with every JDK (bin/jimage).".to_string(),
                "osslsigncode" => {
                    "osslsigncode: not found. Install: https://github.com/mtrojnar/osslsigncode"
                        .to_string()
                }
                other => format!("{other}: not found on $PATH"),
            })
            .collect()
    }
}

/// Probes every program in `programs`. Never fails; a missing tool is
/// reported, not raised.
pub fn detect_tools<'a>(programs: impl IntoIterator<Item = &'a str>) -> ToolAvailability {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for p in programs {
        if probe(p) {
            found.push(p.to_string());
        } else {
            missing.push(p.to_string());
        }
    }
    ToolAvailability { found, missing }
}

/// Returns `true` if `cmd --version` launches, whatever its exit code.
fn probe(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}
