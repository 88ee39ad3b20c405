//! Source Index: scans project directories and records, for every C/C++
//! file, its kind, include directives, declared symbols and content
//! fingerprint.
//!
//! A root or file that cannot be read aborts the scan with [`Error::Io`]. A
//! file whose include directives cannot be extracted is still indexed, with
//! no includes, and the problem is returned as a [`Diagnostic`].

use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::parse::{self, IncludeDirective, Symbol, SymbolRole};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const TRANSLATION_UNIT_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "ino"];
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "h++", "inc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    TranslationUnit,
    Header,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        if TRANSLATION_UNIT_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::TranslationUnit)
        } else if HEADER_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::Header)
        } else {
            None
        }
    }
}

/// SHA-256 of a file's content, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint(format!("{:x}", Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(hex: String) -> Self {
        Fingerprint(hex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.12}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub includes: Vec<IncludeDirective>,
    pub symbols: Vec<Symbol>,
    pub fingerprint: Fingerprint,
}

impl SourceFile {
    pub fn is_translation_unit(&self) -> bool {
        self.kind == SourceKind::TranslationUnit
    }

    /// External symbols this file declares but does not define.
    pub fn symbol_requests(&self) -> Vec<&Symbol> {
        let mut requests: Vec<&Symbol> = self
            .symbols
            .iter()
            .filter(|s| s.role == SymbolRole::Declared && s.linkage.is_external())
            .filter(|s| !self.defines(&s.name))
            .collect();
        requests.sort_by(|a, b| a.name.cmp(&b.name));
        requests.dedup_by(|a, b| a.name == b.name);
        requests
    }

    /// Whether this file carries a definition of `name` visible to the linker.
    pub fn defines(&self, name: &str) -> bool {
        self.symbols
            .iter()
            .any(|s| s.role == SymbolRole::Defined && s.name == name)
    }

    pub fn exports(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| {
            s.role == SymbolRole::Defined && s.linkage.is_external() && s.name == name
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Directories never descended into (e.g. the build output).
    pub skip_dirs: Vec<PathBuf>,
    /// Files indexed even when they sit outside every root (forced sources).
    pub extra_files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SourceIndex {
    project_root: PathBuf,
    files: BTreeMap<PathBuf, SourceFile>,
}

impl SourceIndex {
    /// Walks `roots` (relative to `project_root` unless absolute) and indexes
    /// every translation unit and header found.
    pub fn scan(
        project_root: &Path,
        roots: &[PathBuf],
        options: &ScanOptions,
    ) -> Result<(Self, Vec<Diagnostic>)> {
        let project_root =
            fs::canonicalize(project_root).map_err(|e| Error::io(project_root, e))?;
        let skip_dirs: Vec<PathBuf> = options
            .skip_dirs
            .iter()
            .filter_map(|d| fs::canonicalize(project_root.join(d)).ok())
            .collect();

        let mut candidates = Vec::new();
        let mut diagnostics = Vec::new();

        for root in roots {
            let root_path = project_root.join(root);
            let root_path = fs::canonicalize(&root_path).map_err(|e| Error::io(&root_path, e))?;
            fs::read_dir(&root_path).map_err(|e| Error::io(&root_path, e))?;

            let walker = WalkDir::new(&root_path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !(e.file_type().is_dir()
                            && (is_hidden(e.path())
                                || skip_dirs.iter().any(|s| s == e.path())))
                });

            for entry in walker {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if entry.file_type().is_file()
                            && SourceKind::from_path(path).is_some()
                            && !is_package_path(path)
                        {
                            candidates.push(path.to_path_buf());
                        }
                    }
                    Err(e) => {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root_path.clone());
                        return Err(Error::io(path, e.into()));
                    }
                }
            }
        }

        for extra in &options.extra_files {
            let path = project_root.join(extra);
            if let Ok(path) = fs::canonicalize(&path)
                && SourceKind::from_path(&path).is_some()
            {
                candidates.push(path);
            }
        }

        candidates.sort();
        candidates.dedup();

        let scanned: Vec<(SourceFile, Vec<Diagnostic>)> = candidates
            .par_iter()
            .map(|path| read_source(path))
            .collect::<Result<_>>()?;

        let mut files = BTreeMap::new();
        for (file, diags) in scanned {
            diagnostics.extend(diags);
            files.insert(file.path.clone(), file);
        }

        tracing::info!(
            files = files.len(),
            warnings = diagnostics.len(),
            "indexed project sources"
        );
        Ok((
            Self {
                project_root,
                files,
            },
            diagnostics,
        ))
    }

    /// Builds an index from in-memory sources; paths are taken relative to
    /// `project_root` and are not touched on disk.
    pub fn from_sources(project_root: &Path, sources: &[(&str, &str)]) -> (Self, Vec<Diagnostic>) {
        let mut files = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for (rel, text) in sources {
            let path = project_root.join(rel);
            let Some(kind) = SourceKind::from_path(&path) else {
                continue;
            };
            let (file, diags) = build_source(path, kind, text.as_bytes());
            diagnostics.extend(diags);
            files.insert(file.path.clone(), file);
        }
        (
            Self {
                project_root: project_root.to_path_buf(),
                files,
            },
            diagnostics,
        )
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn get(&self, path: &Path) -> Option<&SourceFile> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// All files in lexical path order.
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn translation_units(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values().filter(|f| f.is_translation_unit())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Absolute, lexically normalized form of a project-relative path.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        normalize_path(&self.project_root.join(path))
    }

    /// `path` relative to the project root, or unchanged if outside it.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_root).unwrap_or(path)
    }
}

fn read_source(path: &Path) -> Result<(SourceFile, Vec<Diagnostic>)> {
    // Candidates are only collected with a known extension.
    let kind = SourceKind::from_path(path).unwrap_or(SourceKind::Header);
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(build_source(path.to_path_buf(), kind, &bytes))
}

fn build_source(path: PathBuf, kind: SourceKind, bytes: &[u8]) -> (SourceFile, Vec<Diagnostic>) {
    let text = String::from_utf8_lossy(bytes);
    let parsed = parse::parse_source(&text);
    let diagnostics = parsed
        .errors
        .iter()
        .map(|(line, message)| Diagnostic::Parse {
            path: path.clone(),
            line: Some(*line),
            message: message.clone(),
        })
        .collect();
    let file = SourceFile {
        fingerprint: Fingerprint::of_bytes(bytes),
        path,
        kind,
        includes: parsed.includes,
        symbols: parsed.symbols,
    };
    (file, diagnostics)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

/// Paths inside a PlatformIO package store (`.platformio/packages/...`)
/// belong to the toolchain, not the project.
fn is_package_path(path: &Path) -> bool {
    let names: Vec<_> = path.components().map(|c| c.as_os_str()).collect();
    names
        .windows(2)
        .any(|w| w[0] == ".platformio" && w[1] == "packages")
}

/// Resolves `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
