use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "cxgraph.toml";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct CxGraphConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default, alias = "forcedSources")]
    pub forced_sources: Vec<ForcedInclusionRule>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ProjectConfig {
    pub name: String,
    /// Entry translation units. Empty means every `main.*` and `*.ino` found.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_src_dirs")]
    pub src_dirs: Vec<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BuildConfig {
    pub compiler: Option<String>,
    #[serde(default = "default_edition")]
    pub edition: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default, alias = "extraIncludeDirs")]
    pub extra_include_dirs: Vec<PathBuf>,
    #[serde(default, alias = "concurrencyLimit")]
    pub concurrency_limit: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            compiler: None,
            edition: default_edition(),
            flags: Vec::new(),
            libs: Vec::new(),
            build_dir: default_build_dir(),
            extra_include_dirs: Vec::new(),
            concurrency_limit: None,
        }
    }
}

/// Forces `path` into the compile set of every translation unit whose
/// project-relative path matches `target`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ForcedInclusionRule {
    pub target: String,
    pub path: PathBuf,
}

impl CxGraphConfig {
    /// Worker count for the compile phase.
    pub fn concurrency(&self) -> usize {
        self.build.concurrency_limit.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn bin_name(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.project.name)
        } else {
            self.project.name.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(Error::Config {
                reason: "[project] name must not be empty".to_string(),
            });
        }
        if self.build.concurrency_limit == Some(0) {
            return Err(Error::Config {
                reason: "concurrency_limit must be at least 1".to_string(),
            });
        }
        if let Some(rule) = self.forced_sources.iter().find(|r| r.target.trim().is_empty()) {
            return Err(Error::Config {
                reason: format!("forced source {} has an empty target", rule.path.display()),
            });
        }
        Ok(())
    }
}

fn default_src_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("src")]
}

fn default_edition() -> String {
    "gnu++17".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(".cxg").join("build")
}

pub fn parse_config(text: &str) -> Result<CxGraphConfig> {
    let config: CxGraphConfig = toml::from_str(text).map_err(|e| Error::Config {
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Reads `cxgraph.toml` from the project root.
pub fn load_config(project_root: &Path) -> Result<CxGraphConfig> {
    let path = project_root.join(CONFIG_FILE);
    let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    parse_config(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[project]\nname = \"blink\"\n").unwrap();
        assert_eq!(config.project.src_dirs, vec![PathBuf::from("src")]);
        assert!(config.project.roots.is_empty());
        assert_eq!(config.build.edition, "gnu++17");
        assert_eq!(config.build.build_dir, PathBuf::from(".cxg/build"));
        assert!(config.forced_sources.is_empty());
        assert!(config.concurrency() >= 1);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
[project]
name = "fixture"
roots = ["src/main.cpp"]
src_dirs = ["src", "lib"]

[build]
compiler = "arm-none-eabi-g++"
flags = ["-mcpu=cortex-m4"]
extra_include_dirs = ["include"]
concurrency_limit = 3

[[forced_sources]]
target = "src/main.cpp"
path = "extra/forced_included.cpp"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.project.roots, vec![PathBuf::from("src/main.cpp")]);
        assert_eq!(config.build.extra_include_dirs, vec![PathBuf::from("include")]);
        assert_eq!(config.concurrency(), 3);
        assert_eq!(
            config.forced_sources,
            vec![ForcedInclusionRule {
                target: "src/main.cpp".to_string(),
                path: PathBuf::from("extra/forced_included.cpp"),
            }]
        );
    }

    #[test]
    fn test_camel_case_aliases() {
        let text = r#"
[project]
name = "fixture"

[build]
extraIncludeDirs = ["include"]
concurrencyLimit = 2

[[forcedSources]]
target = "**/*.ino"
path = "lib/helper.cpp"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.build.extra_include_dirs.len(), 1);
        assert_eq!(config.concurrency(), 2);
        assert_eq!(config.forced_sources[0].target, "**/*.ino");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = parse_config("[project]\nname = \"x\"\n[build]\nconcurrency_limit = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("concurrency_limit"));
    }

    #[test]
    fn test_syntax_error_is_config_error() {
        let err = parse_config("[project\nname = ").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
