use super::{Toolchain, ToolchainError, detect_compiler};
use crate::config::CxGraphConfig;
use std::path::{Path, PathBuf};
use std::process::Command;

/// GCC/Clang-style compiler driver.
#[derive(Debug, Clone)]
pub struct GccToolchain {
    pub compiler: String,
    pub edition: String,
    pub flags: Vec<String>,
    pub libs: Vec<String>,
}

impl GccToolchain {
    pub fn from_config(config: &CxGraphConfig) -> Result<Self, ToolchainError> {
        Ok(Self {
            compiler: detect_compiler(config.build.compiler.as_deref())?,
            edition: config.build.edition.clone(),
            flags: config.build.flags.clone(),
            libs: config.build.libs.clone(),
        })
    }

    fn run(&self, args: &[String]) -> Result<String, ToolchainError> {
        tracing::debug!(command = %args.join(" "), "running");
        let output = Command::new(&args[0]).args(&args[1..]).output()?;
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            Ok(stderr)
        } else {
            Err(ToolchainError::Failed {
                status: output.status.code(),
                output: stderr,
            })
        }
    }
}

impl Toolchain for GccToolchain {
    fn compile(
        &self,
        unit: &Path,
        include_paths: &[PathBuf],
        forced_headers: &[PathBuf],
        object: &Path,
    ) -> Result<String, ToolchainError> {
        self.run(&self.compile_command(unit, include_paths, forced_headers, object))
    }

    fn link(&self, objects: &[PathBuf], output: &Path) -> Result<(), ToolchainError> {
        let mut args = vec![self.compiler.clone()];
        args.extend(objects.iter().map(|o| o.to_string_lossy().to_string()));
        args.push("-o".to_string());
        args.push(output.to_string_lossy().to_string());
        args.extend(self.libs.iter().map(|lib| format!("-l{}", lib)));
        self.run(&args).map(|_| ())
    }

    fn compile_command(
        &self,
        unit: &Path,
        include_paths: &[PathBuf],
        forced_headers: &[PathBuf],
        object: &Path,
    ) -> Vec<String> {
        let ext = unit
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut args = vec![self.compiler.clone()];
        // Sketches are plain C++ with an unusual extension. C units must stay
        // C even under a C++ driver, or `extern "C"` callers cannot link.
        match ext.as_str() {
            "ino" => args.extend(["-x".to_string(), "c++".to_string()]),
            "c" => args.extend(["-x".to_string(), "c".to_string()]),
            _ => {}
        }
        // A C++ standard flag breaks C translation units.
        if ext != "c" || !self.edition.contains("++") {
            args.push(format!("-std={}", self.edition));
        }
        args.push("-c".to_string());
        args.push(unit.to_string_lossy().to_string());
        args.push("-o".to_string());
        args.push(object.to_string_lossy().to_string());
        for dir in include_paths {
            args.push(format!("-I{}", dir.display()));
        }
        for header in forced_headers {
            args.push("-include".to_string());
            args.push(header.to_string_lossy().to_string());
        }
        args.extend(self.flags.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcc() -> GccToolchain {
        GccToolchain {
            compiler: "g++".to_string(),
            edition: "gnu++17".to_string(),
            flags: vec!["-Os".to_string()],
            libs: vec!["m".to_string()],
        }
    }

    #[test]
    fn test_compile_command_shape() {
        let args = gcc().compile_command(
            Path::new("/p/src/main.cpp"),
            &[PathBuf::from("/p/include")],
            &[PathBuf::from("/p/src/cfg.h")],
            Path::new("/p/.cxg/build/obj/src/main.cpp.o"),
        );
        assert_eq!(
            args,
            vec![
                "g++",
                "-std=gnu++17",
                "-c",
                "/p/src/main.cpp",
                "-o",
                "/p/.cxg/build/obj/src/main.cpp.o",
                "-I/p/include",
                "-include",
                "/p/src/cfg.h",
                "-Os",
            ]
        );
    }

    #[test]
    fn test_sketch_is_compiled_as_cpp() {
        let args = gcc().compile_command(Path::new("blink.ino"), &[], &[], Path::new("blink.ino.o"));
        assert_eq!(&args[1..3], &["-x", "c++"]);
    }

    #[test]
    fn test_c_unit_is_compiled_as_c() {
        let args = gcc().compile_command(Path::new("lib/nested.c"), &[], &[], Path::new("nested.c.o"));
        assert_eq!(args, vec!["g++", "-x", "c", "-c", "lib/nested.c", "-o", "nested.c.o", "-Os"]);

        let c11 = GccToolchain {
            edition: "gnu11".to_string(),
            ..gcc()
        };
        let args = c11.compile_command(Path::new("lib/nested.c"), &[], &[], Path::new("nested.c.o"));
        assert_eq!(&args[1..4], &["-x", "c", "-std=gnu11"]);
    }

    #[test]
    fn test_missing_compiler_is_io_error() {
        let tc = GccToolchain {
            compiler: "definitely-not-a-compiler-cxg".to_string(),
            ..gcc()
        };
        let err = tc
            .compile(Path::new("main.cpp"), &[], &[], Path::new("main.o"))
            .unwrap_err();
        assert!(matches!(err, ToolchainError::IoError(_)));
    }
}
