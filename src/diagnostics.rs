//! Non-fatal diagnostics and the reporting interface.
//!
//! The resolver never prints. Anything the operator should see but that does
//! not stop the build (a malformed include line, a symbol assumed to come from
//! a library outside the tree) is handed to a [`Reporter`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A file (or one of its lines) could not be parsed. The file is still indexed.
    Parse {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },
    /// A declared symbol has no definition in the indexed tree and is left to the linker.
    ExternalLinkAssumption {
        symbol: String,
        requested_by: PathBuf,
    },
}

impl Diagnostic {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Diagnostic::Parse { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Parse {
                path,
                line: Some(line),
                message,
            } => write!(f, "{}:{}: {}", path.display(), line, message),
            Diagnostic::Parse {
                path,
                line: None,
                message,
            } => write!(f, "{}: {}", path.display(), message),
            Diagnostic::ExternalLinkAssumption {
                symbol,
                requested_by,
            } => write!(
                f,
                "`{}` (declared in {}) has no definition in the project; assuming it is linked from a library",
                symbol,
                requested_by.display()
            ),
        }
    }
}

/// Receives diagnostics for surfacing to the operator.
pub trait Reporter: Sync {
    fn report(&self, diagnostic: &Diagnostic);

    fn report_all(&self, diagnostics: &[Diagnostic]) {
        for d in diagnostics {
            self.report(d);
        }
    }
}

/// Forwards diagnostics to the `tracing` subscriber as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::Parse { .. } => tracing::warn!(kind = "parse", "{}", diagnostic),
            Diagnostic::ExternalLinkAssumption { .. } => {
                tracing::warn!(kind = "external-link", "{}", diagnostic)
            }
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    seen: Mutex<Vec<Diagnostic>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        match self.seen.lock() {
            Ok(mut seen) => std::mem::take(&mut *seen),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, diagnostic: &Diagnostic) {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(diagnostic.clone()),
            Err(poisoned) => poisoned.into_inner().push(diagnostic.clone()),
        }
    }
}
