//! Toolchain adapter
//!
//! The build executor only talks to a [`Toolchain`]: compile one translation
//! unit to one object, then link objects into the final binary. The stock
//! implementation drives a GCC-compatible compiler driver; tests plug in
//! their own.

pub mod gcc;
pub mod types;

pub use gcc::GccToolchain;
pub use types::ToolchainError;

use std::path::{Path, PathBuf};

pub trait Toolchain: Sync {
    /// Compiles `unit` into `object`, with every header of `forced_headers`
    /// prepended. Returns the compiler's diagnostic output (warnings) on
    /// success.
    fn compile(
        &self,
        unit: &Path,
        include_paths: &[PathBuf],
        forced_headers: &[PathBuf],
        object: &Path,
    ) -> Result<String, ToolchainError>;

    fn link(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolchainError>;

    /// The argv `compile` would run, for `compile_commands.json`.
    fn compile_command(
        &self,
        unit: &Path,
        include_paths: &[PathBuf],
        forced_headers: &[PathBuf],
        object: &Path,
    ) -> Vec<String>;
}

/// Picks the compiler driver: explicit choice, then `$CXX`, then the first of
/// `clang++`, `g++`, `c++` found on `PATH`.
pub fn detect_compiler(preferred: Option<&str>) -> Result<String, ToolchainError> {
    if let Some(compiler) = preferred {
        return Ok(compiler.to_string());
    }
    if let Ok(cxx) = std::env::var("CXX")
        && !cxx.trim().is_empty()
    {
        return Ok(cxx);
    }

    for candidate in ["clang++", "g++", "c++"] {
        if let Ok(output) = std::process::Command::new("which").arg(candidate).output()
            && output.status.success()
        {
            tracing::debug!(compiler = candidate, "detected compiler");
            return Ok(candidate.to_string());
        }
    }

    Err(ToolchainError::NotFound(
        "No C++ compiler found. Install clang or gcc, or set [build] compiler.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_compiler_wins() {
        assert_eq!(
            detect_compiler(Some("arm-none-eabi-g++")).unwrap(),
            "arm-none-eabi-g++"
        );
    }

    #[test]
    fn test_failed_output_is_stderr() {
        let err = ToolchainError::Failed {
            status: Some(1),
            output: "main.cpp:3: error: boom".to_string(),
        };
        assert_eq!(err.output(), "main.cpp:3: error: boom");
        assert_eq!(err.to_string(), "exited with status 1");
    }
}
