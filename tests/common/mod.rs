//! Shared fixture project and a recording toolchain for integration tests.

#![allow(dead_code)]

use cxgraph::toolchain::{Toolchain, ToolchainError};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub const MAIN_CPP: &str = r#"#include "nothingA.h"
#include "nothingB.h"

extern "C" {
void nested();
void nested_nested();
}

void forced_included();
void doNothingC();

void setup() {
    doNothingA();
    doNothingB();
    doNothingC();
    nested();
    nested_nested();
    forced_included();
}

void loop() {
}
"#;

pub const FORCED_RULE: &str = r#"
[[forced_sources]]
target = "src/main.cpp"
path = "extra/forced_included.cpp"
"#;

/// Writes the sketch fixture: `main.cpp`, two headers, one defining unit per
/// symbol under `lib/`, and `extra/forced_included.cpp` outside the scanned
/// directories.
pub fn fixture_project(with_forced_rule: bool) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_config(root, with_forced_rule);
    write(root, "src/main.cpp", MAIN_CPP);
    write(root, "src/nothingA.h", "#pragma once\nvoid doNothingA();\n");
    write(root, "src/nothingB.h", "#pragma once\nvoid doNothingB();\n");
    write(root, "lib/nothingA.cpp", "#include \"nothingA.h\"\nvoid doNothingA() {}\n");
    write(root, "lib/nothingB.cpp", "#include \"nothingB.h\"\nvoid doNothingB() {}\n");
    write(root, "lib/nested.c", "void nested(void) {}\n");
    write(root, "lib/nested_nested.c", "void nested_nested(void) {}\n");
    write(root, "lib/doNothingC.cpp", "void doNothingC() {}\n");
    write(root, "extra/forced_included.cpp", "void forced_included() {}\n");
    dir
}

pub fn write_config(root: &Path, with_forced_rule: bool) {
    let mut config = String::from(
        r#"[project]
name = "fixture"
roots = ["src/main.cpp"]
src_dirs = ["src", "lib"]

[build]
extra_include_dirs = ["src"]
concurrency_limit = 2
"#,
    );
    if with_forced_rule {
        config.push_str(FORCED_RULE);
    }
    write(root, "cxgraph.toml", &config);
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Project-relative, `/`-separated form of an absolute path.
pub fn rel(root: &Path, path: &Path) -> String {
    let root = fs::canonicalize(root).unwrap();
    path.strip_prefix(&root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Writes a placeholder object per compile and a placeholder binary per link,
/// failing any unit whose file name is in `fail_on`. Units named in `delays`
/// take that long to compile (or to fail).
#[derive(Default)]
pub struct RecordingToolchain {
    pub fail_on: BTreeSet<String>,
    pub delays: BTreeMap<String, Duration>,
    pub compiled: Mutex<Vec<PathBuf>>,
    pub links: Mutex<Vec<Vec<PathBuf>>>,
}

impl RecordingToolchain {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: BTreeSet::from([name.to_string()]),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, name: &str, millis: u64) -> Self {
        self.delays.insert(name.to_string(), Duration::from_millis(millis));
        self
    }

    pub fn compiled(&self) -> Vec<PathBuf> {
        let mut calls = self.compiled.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    /// Objects passed to the most recent link.
    pub fn last_link(&self) -> Option<Vec<PathBuf>> {
        self.links.lock().unwrap().last().cloned()
    }
}

impl Toolchain for RecordingToolchain {
    fn compile(
        &self,
        unit: &Path,
        _include_paths: &[PathBuf],
        _forced_headers: &[PathBuf],
        object: &Path,
    ) -> Result<String, ToolchainError> {
        self.compiled.lock().unwrap().push(unit.to_path_buf());
        let name = unit.file_name().unwrap().to_string_lossy().to_string();
        if let Some(delay) = self.delays.get(&name) {
            std::thread::sleep(*delay);
        }
        if self.fail_on.contains(&name) {
            return Err(ToolchainError::Failed {
                status: Some(1),
                output: format!("{}:1: error: expected ';'", name),
            });
        }
        fs::write(object, b"obj")?;
        Ok(String::new())
    }

    fn link(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolchainError> {
        self.links.lock().unwrap().push(objects.to_vec());
        fs::write(output, b"bin")?;
        Ok(())
    }

    fn compile_command(
        &self,
        unit: &Path,
        _include_paths: &[PathBuf],
        _forced_headers: &[PathBuf],
        object: &Path,
    ) -> Vec<String> {
        vec![
            "fake-cc".to_string(),
            "-c".to_string(),
            unit.to_string_lossy().to_string(),
            "-o".to_string(),
            object.to_string_lossy().to_string(),
        ]
    }
}
