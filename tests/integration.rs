//! Integration tests for the repcheck binary.
//!
//! These tests invoke the compiled `repcheck` binary end-to-end against
//! artifact trees built in temp directories, checking the rendered report,
//! the stderr summary and the exit code together.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Returns the path to the compiled `repcheck` binary.
fn repcheck_bin() -> PathBuf {
    if let Some(p) = std::env::var_os("CARGO_BIN_EXE_repcheck") {
        PathBuf::from(p)
    } else {
        let mut path = std::env::current_exe()
            .expect("cannot determine test binary path")
            .parent()
            .expect("no parent directory")
            .parent()
            .expect("no grandparent directory")
            .to_path_buf();
        path.push("repcheck");
        path
    }
}

/// A built/official pair of artifact trees.
struct Trees {
    dir: TempDir,
}

impl Trees {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("built")).unwrap();
        fs::create_dir_all(dir.path().join("official")).unwrap();
        Self { dir }
    }

    fn root(&self, side: &str) -> PathBuf {
        self.dir.path().join(side)
    }

    fn write(&self, side: &str, rel: &str, data: &[u8]) {
        let p = self.root(side).join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, data).unwrap();
    }

    fn both(&self, rel: &str, data: &[u8]) {
        self.write("built", rel, data);
        self.write("official", rel, data);
    }

    fn zip(&self, side: &str, rel: &str, entries: &[(&str, &str)], method: CompressionMethod) {
        let p = self.root(side).join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        let mut w = ZipWriter::new(fs::File::create(&p).unwrap());
        let opts = SimpleFileOptions::default().compression_method(method);
        for (name, data) in entries {
            w.start_file(*name, opts).unwrap();
            w.write_all(data.as_bytes()).unwrap();
        }
        w.finish().unwrap();
    }

    fn profile(&self, json: &str) -> PathBuf {
        let p = self.dir.path().join("profile.json");
        fs::write(&p, json).unwrap();
        p
    }

    fn compare(&self, extra: &[&str]) -> Output {
        Command::new(repcheck_bin())
            .arg("compare")
            .arg("--built")
            .arg(self.root("built"))
            .arg("--official")
            .arg(self.root("official"))
            .args(extra)
            .output()
            .expect("failed to execute repcheck")
    }
}

fn stdout(o: &Output) -> String {
    String::from_utf8_lossy(&o.stdout).into_owned()
}

fn stderr(o: &Output) -> String {
    String::from_utf8_lossy(&o.stderr).into_owned()
}

fn json_report(o: &Output) -> serde_json::Value {
    serde_json::from_slice(&o.stdout).unwrap_or_else(|e| {
        panic!("stdout is not JSON ({e}):\n{}\nstderr: {}", stdout(o), stderr(o))
    })
}

// -------------------------------------------------------------------------
// Verdicts
// -------------------------------------------------------------------------

#[test]
fn test_identical_trees_exit_zero_with_yaml_report() {
    let t = Trees::new();
    t.both("bin/app", b"elf");
    t.both("lib/libapp.so", b"so");

    let out = t.compare(&[]);
    assert_eq!(
        out.status.code(),
        Some(0),
        "identical trees must be reproducible.\nstdout: {}\nstderr: {}",
        stdout(&out),
        stderr(&out)
    );
    let report: serde_yaml::Value = serde_yaml::from_slice(&out.stdout).unwrap();
    assert_eq!(report["status"].as_str(), Some("reproducible"));
    assert_eq!(report["build_type"].as_str(), Some("tarball"));
    assert!(report["script_version"].as_str().is_some());
    assert!(report["files"].as_sequence().unwrap().is_empty());
    assert!(stderr(&out).contains("✓ files"));
    assert!(stderr(&out).contains("→ Verdict: reproducible"));
}

#[test]
fn test_extra_legal_file_is_reported_but_tolerated() {
    let t = Trees::new();
    t.both("bin/app", b"elf");
    t.write("official", "legal/java.base/LICENSE", b"GPL");

    let out = t.compare(&["--format", "json"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let v = json_report(&out);
    assert_eq!(v["status"], "reproducible");
    assert_eq!(v["excluded_paths"]["count"], 1);
    assert_eq!(v["excluded_paths"]["paths"][0], "legal/java.base/LICENSE");
    assert!(v["notes"].as_str().unwrap().contains("excluded_delta=1"));
}

#[test]
fn test_changed_file_exits_one_and_still_writes_report() {
    let t = Trees::new();
    t.write("built", "bin/app", b"elf v1");
    t.write("official", "bin/app", b"elf v2");
    let report_path = t.dir.path().join("out/verdict.yaml");

    let out = t.compare(&["--output", report_path.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    let report = fs::read_to_string(&report_path).expect("report must be written on failure");
    assert!(report.contains("status: not_reproducible"));
    assert!(report.contains("bin/app"));
    assert!(stdout(&out).is_empty(), "report went to --output, not stdout");
    assert!(stderr(&out).contains("✗ files (1 differing)"));
}

#[test]
fn test_three_changed_classes_fail_modules_tier() {
    let t = Trees::new();
    let classes = |v: &'static str| {
        [
            ("java.base/A.class", v),
            ("java.base/B.class", v),
            ("java.base/C.class", v),
            ("java.base/Object.class", "same"),
        ]
    };
    t.zip("built", "lib/modules", &classes("1"), CompressionMethod::Stored);
    t.zip("official", "lib/modules", &classes("2"), CompressionMethod::Stored);
    let profile = t.profile(r#"{"name": "jdk", "container_files": ["lib/modules"]}"#);

    let out = t.compare(&["--profile", profile.to_str().unwrap(), "--format", "json"]);
    assert_eq!(out.status.code(), Some(1), "stderr: {}", stderr(&out));
    let v = json_report(&out);
    assert!(v["notes"].as_str().unwrap().contains("modules=false"));
    let modules = v["tiers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "modules")
        .unwrap();
    assert_eq!(modules["diff_count"], 3);
    assert_eq!(
        modules["differing_paths"],
        serde_json::json!([
            "lib/modules!/java.base/A.class",
            "lib/modules!/java.base/B.class",
            "lib/modules!/java.base/C.class"
        ])
    );
}

#[test]
fn test_repacked_jar_is_reproducible_despite_hash_mismatch() {
    let t = Trees::new();
    t.zip(
        "built",
        "lib/app.jar",
        &[("a/Main.class", "main"), ("a/Util.class", "util")],
        CompressionMethod::Stored,
    );
    t.zip(
        "official",
        "lib/app.jar",
        &[("a/Util.class", "util"), ("a/Main.class", "main")],
        CompressionMethod::Deflated,
    );
    let profile = t.profile(
        r#"{"container_files": ["lib/app.jar"], "artifacts": ["lib/app.jar"], "build_type": "jar"}"#,
    );

    let out = t.compare(&["--profile", profile.to_str().unwrap(), "--format", "json"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let v = json_report(&out);
    assert_eq!(v["build_type"], "jar");
    assert_eq!(v["files"][0]["filename"], "lib/app.jar");
    assert_eq!(v["files"][0]["match"], false);
    assert_ne!(v["files"][0]["hash"], v["files"][0]["official_hash"]);
    assert!(v["notes"]
        .as_str()
        .unwrap()
        .contains("tiered verdict is authoritative"));
}

#[test]
fn test_corrupt_official_container_is_not_reproducible() {
    let t = Trees::new();
    t.zip(
        "built",
        "lib/modules",
        &[("java.base/A.class", "1")],
        CompressionMethod::Stored,
    );
    t.write("official", "lib/modules", b"truncated");
    let profile = t.profile(r#"{"container_files": ["lib/modules"]}"#);

    let out = t.compare(&["--profile", profile.to_str().unwrap(), "--format", "json"]);
    assert_eq!(out.status.code(), Some(1));
    let v = json_report(&out);
    assert_eq!(v["status"], "not_reproducible");
    let notes = v["notes"].as_str().unwrap();
    assert!(notes.contains("modules=false"), "{notes}");
    assert!(notes.contains("extraction of official failed"), "{notes}");
}

#[test]
fn test_cli_tags_override_profile() {
    let t = Trees::new();
    t.both("f", b"x");
    let out = t.compare(&["--build-type", "deb", "--arch", "aarch64", "--format", "json"]);
    let v = json_report(&out);
    assert_eq!(v["build_type"], "deb");
    assert_eq!(v["architecture"], "aarch64");
}

// -------------------------------------------------------------------------
// Input errors
// -------------------------------------------------------------------------

#[test]
fn test_missing_root_exits_two_without_report() {
    let t = Trees::new();
    let out = Command::new(repcheck_bin())
        .arg("compare")
        .arg("--built")
        .arg(t.root("does-not-exist"))
        .arg("--official")
        .arg(t.root("official"))
        .output()
        .expect("failed to execute repcheck");
    assert_eq!(out.status.code(), Some(2));
    assert!(stdout(&out).is_empty());
    assert!(stderr(&out).contains("does not exist"), "{}", stderr(&out));
}

#[test]
fn test_malformed_profile_exits_two() {
    let t = Trees::new();
    t.both("f", b"x");
    let profile = t.profile(r#"{"critical_files": ["../etc/passwd"]}"#);
    let out = t.compare(&["--profile", profile.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("critical_files"));
}

#[test]
fn test_unknown_profile_key_exits_two() {
    let t = Trees::new();
    let profile = t.profile(r#"{"critcal_files": []}"#);
    let out = t.compare(&["--profile", profile.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_bad_usage_exits_two() {
    let out = Command::new(repcheck_bin())
        .args(["compare", "--built", "x"])
        .output()
        .expect("failed to execute repcheck");
    assert_eq!(out.status.code(), Some(2));
}

// -------------------------------------------------------------------------
// Helper subcommands
// -------------------------------------------------------------------------

#[test]
fn test_list_prints_sorted_relative_paths() {
    let t = Trees::new();
    t.write("built", "z.txt", b"");
    t.write("built", "a/b.txt", b"");
    t.write("built", "a.txt", b"");
    let out = Command::new(repcheck_bin())
        .arg("list")
        .arg(t.root("built"))
        .output()
        .expect("failed to execute repcheck");
    assert!(out.status.success());
    assert_eq!(stdout(&out), "a.txt\na/b.txt\nz.txt\n");
}

#[test]
fn test_hash_prints_sha256_lines() {
    let t = Trees::new();
    t.write("built", "hello", b"hello world");
    let file = t.root("built").join("hello");
    let out = Command::new(repcheck_bin())
        .arg("hash")
        .arg(&file)
        .output()
        .expect("failed to execute repcheck");
    assert!(out.status.success());
    assert_eq!(
        stdout(&out),
        format!(
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9  {}\n",
            file.display()
        )
    );
}

#[test]
fn test_tools_reports_missing_extractor() {
    let t = Trees::new();
    let profile = t.profile(
        r#"{"extractor": {"kind": "command", "program": "repcheck-no-such-jimage", "args": ["extract", "--dir", "{dest}", "{archive}"]}}"#,
    );
    let out = Command::new(repcheck_bin())
        .arg("tools")
        .arg("--profile")
        .arg(&profile)
        .output()
        .expect("failed to execute repcheck");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("repcheck-no-such-jimage: not found"));
}
