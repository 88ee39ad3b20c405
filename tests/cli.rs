//! Smoke tests for the `cxg` binary. None of these invoke a compiler.

mod common;

use common::fixture_project;
use std::path::Path;
use std::process::{Command, Output};

fn cxg(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cxg"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute cxg")
}

#[test]
fn test_tree_explains_forced_and_symbol_edges() {
    let project = fixture_project(true);
    let output = cxg(project.path(), &["tree"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("src/main.cpp\n"), "{stdout}");
    assert!(stdout.contains("extra/forced_included.cpp (forced)"), "{stdout}");
    assert!(stdout.contains("lib/doNothingC.cpp (defines `doNothingC`)"), "{stdout}");
    assert!(stdout.contains("src/nothingA.h (included)"), "{stdout}");
}

#[test]
fn test_plan_on_fresh_project_lists_every_unit() {
    let project = fixture_project(true);
    let output = cxg(project.path(), &["plan"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Wave 1"), "{stdout}");
    assert!(stdout.contains("(never built)"), "{stdout}");
    assert!(stdout.contains("7 of 7 units stale"), "{stdout}");
}

#[test]
fn test_scan_counts_files() {
    let project = fixture_project(true);
    let output = cxg(project.path(), &["scan"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Indexed 9 files (7 translation units, 2 headers)"),
        "{stdout}"
    );
}

#[test]
fn test_ambiguous_symbol_fails_with_candidates() {
    let project = fixture_project(true);
    common::write(project.path(), "lib/again.cpp", "void doNothingC() {}\n");

    let output = cxg(project.path(), &["tree"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("doNothingC"), "{stderr}");
    assert!(stderr.contains("again.cpp"), "{stderr}");
}

#[test]
fn test_missing_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = cxg(dir.path(), &["plan"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cxgraph.toml"));
}
