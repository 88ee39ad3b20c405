//! Build artifact cleanup for `cxg clean`: removes the build directory
//! (objects, binary, fingerprint cache) and the compile database.

use super::compdb::COMPILE_COMMANDS;
use crate::config::CxGraphConfig;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

/// Returns whether anything was removed.
pub fn clean(project_root: &Path, config: &CxGraphConfig) -> Result<bool> {
    let mut cleaned = false;

    let build_dir = project_root.join(&config.build.build_dir);
    if build_dir.exists() {
        fs::remove_dir_all(&build_dir)
            .with_context(|| format!("Failed to remove {}", build_dir.display()))?;
        cleaned = true;
    }

    let compdb = project_root.join(COMPILE_COMMANDS);
    if compdb.exists() {
        fs::remove_file(&compdb).context("Failed to remove compile commands")?;
        cleaned = true;
    }

    if cleaned {
        println!("{} Clean complete.", "✓".green());
    } else {
        println!("{} Nothing to clean", "!".yellow());
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::tempdir;

    #[test]
    fn test_clean_removes_outputs_and_keeps_sources() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        let config = parse_config("[project]\nname = \"app\"\n")?;
        fs::create_dir_all(root.join(".cxg/build/obj"))?;
        fs::create_dir_all(root.join("src"))?;
        fs::write(root.join(".cxg/build/fingerprints.json"), "{}")?;
        fs::write(root.join(COMPILE_COMMANDS), "[]")?;
        fs::write(root.join("src/main.cpp"), "int main() {}")?;

        assert!(clean(root, &config)?);
        assert!(!root.join(".cxg/build").exists());
        assert!(!root.join(COMPILE_COMMANDS).exists());
        assert!(root.join("src/main.cpp").exists());

        assert!(!clean(root, &config)?);
        Ok(())
    }
}
