use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use repcheck::{
    exit::{self, codes},
    hasher,
    lister::ArtifactTree,
    report::{self, Format, VerdictRecord},
    signature::{self, PeSignatureStripper},
    toolcheck, Engine, Roots, TargetProfile,
};

#[derive(Parser)]
#[command(
    name = "repcheck",
    about = "Reproducible-build verdicts: compare a local build against an official release",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Compare a built tree against an official one and emit a verdict
    Compare {
        /// Root of the locally built artifact tree
        #[arg(long)]
        built: PathBuf,

        /// Root of the extracted official release
        #[arg(long)]
        official: PathBuf,

        /// Target profile JSON (built-in defaults when omitted)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Directory holding the built whole-artifact files (defaults to --built)
        #[arg(long)]
        built_artifacts: Option<PathBuf>,

        /// Directory holding the official whole-artifact files (defaults to --official)
        #[arg(long)]
        official_artifacts: Option<PathBuf>,

        /// Override the profile's build type tag
        #[arg(long)]
        build_type: Option<String>,

        /// Override the profile's architecture tag
        #[arg(long)]
        arch: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,

        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the sorted relative paths of an artifact tree
    List { dir: PathBuf },

    /// Print SHA-256 digests of files
    Hash {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Remove Authenticode signatures before hashing
        #[arg(long)]
        strip_signature: bool,
    },

    /// Check that the external programs a profile needs are installed
    Tools {
        #[arg(long)]
        profile: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let outcome = match cli.cmd {
        Cmd::Compare {
            built,
            official,
            profile,
            built_artifacts,
            official_artifacts,
            build_type,
            arch,
            format,
            output,
        } => {
            let roots = Roots {
                built_artifacts: built_artifacts.unwrap_or_else(|| built.clone()),
                official_artifacts: official_artifacts.unwrap_or_else(|| official.clone()),
                built,
                official,
            };
            compare(
                &roots,
                profile.as_deref(),
                build_type,
                arch,
                format,
                output.as_deref(),
            )
        }
        Cmd::List { dir } => list(&dir),
        Cmd::Hash {
            files,
            strip_signature,
        } => hash(&files, strip_signature),
        Cmd::Tools { profile } => tools(profile.as_deref()),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit::code_for(&e))
        }
    }
}

fn compare(
    roots: &Roots,
    profile_path: Option<&Path>,
    build_type: Option<String>,
    arch: Option<String>,
    format: Format,
    output: Option<&Path>,
) -> Result<u8> {
    let mut profile = TargetProfile::load(profile_path)?;
    if let Some(t) = build_type {
        profile.build_type = t;
    }
    if let Some(a) = arch {
        profile.architecture = a;
    }

    let record = Engine::new(profile)?.run(roots)?;
    let rendered = report::render(&record, format)?;

    match output {
        Some(p) => report::write_report(p, &rendered)?,
        None => print!("{rendered}"),
    }

    print_summary(&record);
    if let Some(p) = output {
        eprintln!("→ Report: {}", p.display());
    }

    Ok(if record.status.is_reproducible() {
        codes::REPRODUCIBLE
    } else {
        codes::NOT_REPRODUCIBLE
    })
}

fn print_summary(record: &VerdictRecord) {
    for t in &record.tiers {
        let mark = if t.passed() { '✓' } else { '✗' };
        match t.diff_count() {
            Some(n) if n > 0 => eprintln!("{mark} {} ({n} differing)", t.name()),
            _ => eprintln!("{mark} {}", t.name()),
        }
    }
    for f in &record.files {
        let mark = if f.matched { '✓' } else { '✗' };
        eprintln!("{mark} artifact {}", f.filename);
    }
    if !record.warnings.is_empty() {
        eprintln!("⚠ Warnings: {}", record.warnings.join(", "));
    }
    if record.excluded_paths.count > 0 {
        eprintln!("  {} excluded path(s) differ", record.excluded_paths.count);
    }
    eprintln!("→ Verdict: {}", record.status.as_str());
}

fn list(dir: &Path) -> Result<u8> {
    let tree = ArtifactTree::scan("tree", dir)?;
    for p in tree.paths() {
        println!("{p}");
    }
    Ok(codes::REPRODUCIBLE)
}

fn hash(files: &[PathBuf], strip_signature: bool) -> Result<u8> {
    for f in files {
        let digest = if strip_signature {
            let n = signature::normalize(&PeSignatureStripper, f)?;
            if let Some(w) = n.warning {
                eprintln!("⚠ {w}");
            }
            hasher::sha256_bytes(&n.bytes)
        } else {
            hasher::sha256_file(f).with_context(|| format!("hashing {}", f.display()))?
        };
        println!("{digest}  {}", f.display());
    }
    Ok(codes::REPRODUCIBLE)
}

fn tools(profile_path: Option<&Path>) -> Result<u8> {
    let profile = TargetProfile::load(profile_path)?;
    let avail = toolcheck::detect_tools(profile.external_programs());
    for t in &avail.found {
        println!("✓ {t}");
    }
    for line in avail.missing_tools_report() {
        eprintln!("✗ {line}");
    }
    if avail.found.is_empty() && avail.missing.is_empty() {
        println!("profile {} needs no external tools", profile.name);
    }
    Ok(if avail.all_available() {
        codes::REPRODUCIBLE
    } else {
        codes::FAILURE
    })
}
