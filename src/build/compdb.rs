//! `compile_commands.json` for editors and clang tooling.

use crate::error::{Error, Result};
use crate::schedule::CompilePlan;
use crate::toolchain::Toolchain;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

pub const COMPILE_COMMANDS: &str = "compile_commands.json";

/// Writes one entry per translation unit of the plan, stale or not, to
/// `<project_root>/compile_commands.json`.
pub fn write_compile_commands(
    project_root: &Path,
    plan: &CompilePlan,
    toolchain: &dyn Toolchain,
    include_paths: &[PathBuf],
) -> Result<PathBuf> {
    let directory = project_root.to_string_lossy();
    let entries: Vec<serde_json::Value> = plan
        .entries
        .iter()
        .map(|entry| {
            let args = toolchain.compile_command(
                &entry.unit,
                include_paths,
                &entry.forced_headers,
                &entry.object,
            );
            json!({
                "directory": directory,
                "command": args.join(" "),
                "file": entry.unit.to_string_lossy()
            })
        })
        .collect();

    let json_str = serde_json::to_string_pretty(&entries).map_err(|e| Error::Cache {
        reason: e.to_string(),
    })?;
    let path = project_root.join(COMPILE_COMMANDS);
    fs::write(&path, json_str).map_err(|e| Error::io(&path, e))?;
    tracing::debug!(entries = entries.len(), "wrote {}", path.display());
    Ok(path)
}
