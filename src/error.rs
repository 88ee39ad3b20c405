//! Error taxonomy for the resolver and the build executor.
//!
//! Structural problems (unresolved includes, ambiguous symbols) are collected
//! and returned together so the operator can fix them in one pass. Parse
//! problems are not errors at all; they travel as [`crate::diagnostics::Diagnostic`]s.

use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A root directory or a required file could not be read.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// Every include directive (or forced source) that names no indexed file.
    #[error("{} unresolved include(s):{}", .0.len(), bullet_list(.0))]
    UnresolvedInclude(Vec<UnresolvedReference>),

    /// Every symbol request that matched more than one definition.
    #[error("{} ambiguous symbol(s):{}", .0.len(), bullet_list(.0))]
    AmbiguousSymbol(Vec<AmbiguousSymbol>),

    /// Several structural errors found during the same graph build.
    #[error("dependency graph has {} problem group(s):{}", .0.len(), bullet_list(.0))]
    Structural(Vec<Error>),

    #[error("root {} is not an indexed translation unit", .0.display())]
    UnknownRoot(PathBuf),

    /// Textual or forced inclusion loops back through a translation unit.
    #[error("inclusion cycle through translation units: {}", render_cycle(.path))]
    Cycle { path: Vec<PathBuf> },

    /// A header in a unit's compile closure vanished before compilation.
    #[error("{} depends on {}, which no longer exists", .unit.display(), .missing.display())]
    MissingDependency { unit: PathBuf, missing: PathBuf },

    #[error("failed to compile {}:\n{message}", .path.display())]
    Compile { path: PathBuf, message: String },

    #[error("link failed:\n{message}")]
    Link { message: String },

    #[error("build cancelled")]
    Cancelled,

    #[error("fingerprint cache error: {reason}")]
    Cache { reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// A reference that should have named an indexed file but did not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnresolvedReference {
    Include {
        from: PathBuf,
        line: usize,
        target: String,
    },
    ForcedSource {
        target_glob: String,
        path: PathBuf,
    },
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReference::Include { from, line, target } => {
                write!(f, "{}:{}: \"{}\"", from.display(), line, target)
            }
            UnresolvedReference::ForcedSource { target_glob, path } => {
                write!(
                    f,
                    "forced source {} (for '{}') is not in the index",
                    path.display(),
                    target_glob
                )
            }
        }
    }
}

/// A symbol request with several candidate definitions and no priority rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AmbiguousSymbol {
    pub symbol: String,
    pub requested_by: PathBuf,
    pub candidates: Vec<PathBuf>,
}

impl fmt::Display for AmbiguousSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let candidates: Vec<String> = self
            .candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        write!(
            f,
            "`{}` requested by {} is defined in {}",
            self.symbol,
            self.requested_by.display(),
            candidates.join(", ")
        )
    }
}

fn bullet_list<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|item| format!("\n  - {}", item)).collect()
}

fn render_cycle(path: &[PathBuf]) -> String {
    path.iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
