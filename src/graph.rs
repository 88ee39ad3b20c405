//! Dependency Graph Builder.
//!
//! Three kinds of edge are layered over the Source Index:
//!
//! - **Include**: textual `#include`, resolved same-directory first (quoted
//!   form only), then through the include search path; first match wins.
//! - **Forced**: configuration says a file must be built alongside every
//!   translation unit matching a glob, whether or not anything includes it.
//! - **Symbol**: a declared-but-undefined external function is matched against
//!   the one translation unit that defines it (whole-index, second pass).
//!
//! Edge kinds stay distinct so later stages can say *why* a file is needed.

use crate::config::ForcedInclusionRule;
use crate::diagnostics::Diagnostic;
use crate::error::{AmbiguousSymbol, Error, Result, UnresolvedReference};
use crate::index::{SourceFile, SourceIndex, normalize_path};
use crate::parse::{IncludeDirective, IncludeStyle};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Include,
    Forced,
    /// Resolved link-time reference to the named symbol.
    Symbol(String),
}

impl EdgeKind {
    /// Include and forced edges shape what is compiled together; symbol
    /// edges only matter to the linker.
    pub fn is_structural(&self) -> bool {
        matches!(self, EdgeKind::Include | EdgeKind::Forced)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Include => write!(f, "included"),
            EdgeKind::Forced => write!(f, "forced"),
            EdgeKind::Symbol(name) => write!(f, "defines `{}`", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub kind: EdgeKind,
}

/// Glob over project-relative paths: `*` stays within a segment, `**`
/// crosses segments, `?` is one character.
#[derive(Debug, Clone)]
pub struct TargetGlob {
    pattern: String,
    regex: Regex,
}

impl TargetGlob {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut re = String::from("^");
        let chars: Vec<char> = pattern.trim_start_matches("./").chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' if chars.get(i + 1) == Some(&'*') => {
                    if chars.get(i + 2) == Some(&'/') {
                        re.push_str("(?:.*/)?");
                        i += 2;
                    } else {
                        re.push_str(".*");
                        i += 1;
                    }
                }
                '*' => re.push_str("[^/]*"),
                '?' => re.push_str("[^/]"),
                c => re.push_str(&regex::escape(&c.to_string())),
            }
            i += 1;
        }
        re.push('$');
        let regex = Regex::new(&re).map_err(|e| Error::Config {
            reason: format!("invalid target glob '{}': {}", pattern, e),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, relative: &Path) -> bool {
        let text = relative.to_string_lossy().replace('\\', "/");
        self.regex.is_match(&text)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    index: SourceIndex,
    include_dirs: Vec<PathBuf>,
    outgoing: BTreeMap<PathBuf, Vec<Edge>>,
    forced_files: BTreeSet<PathBuf>,
}

impl DependencyGraph {
    /// Builds the graph. Every unresolvable quoted include and every
    /// ambiguous symbol is reported at once; symbols with no definition in
    /// the tree come back as [`Diagnostic::ExternalLinkAssumption`].
    pub fn build(
        index: SourceIndex,
        rules: &[ForcedInclusionRule],
        include_dirs: &[PathBuf],
    ) -> Result<(Self, Vec<Diagnostic>)> {
        let include_dirs: Vec<PathBuf> = include_dirs.iter().map(|d| index.absolute(d)).collect();
        let mut edges: BTreeSet<Edge> = BTreeSet::new();
        let mut unresolved = Vec::new();
        let mut ambiguous = Vec::new();
        let mut diagnostics = Vec::new();

        // Pass 1: textual includes.
        for file in index.files() {
            for directive in &file.includes {
                match resolve_include(&index, file, directive, &include_dirs) {
                    Some(to) => {
                        edges.insert(Edge {
                            from: file.path.clone(),
                            to,
                            kind: EdgeKind::Include,
                        });
                    }
                    None if directive.style == IncludeStyle::Angle => {
                        tracing::debug!(
                            from = %file.path.display(),
                            "treating <{}> as a system header",
                            directive.target
                        );
                    }
                    None => unresolved.push(UnresolvedReference::Include {
                        from: file.path.clone(),
                        line: directive.line,
                        target: directive.target.clone(),
                    }),
                }
            }
        }

        // Pass 2: forced sources.
        let mut forced_files = BTreeSet::new();
        for rule in rules {
            let glob = TargetGlob::new(&rule.target)?;
            let forced = index.absolute(&rule.path);
            if !index.contains(&forced) {
                unresolved.push(UnresolvedReference::ForcedSource {
                    target_glob: rule.target.clone(),
                    path: rule.path.clone(),
                });
                continue;
            }
            forced_files.insert(forced.clone());

            let mut matched = 0;
            for unit in index.translation_units() {
                if unit.path != forced && glob.matches(index.relative(&unit.path)) {
                    matched += 1;
                    edges.insert(Edge {
                        from: unit.path.clone(),
                        to: forced.clone(),
                        kind: EdgeKind::Forced,
                    });
                }
            }
            if matched == 0 {
                tracing::warn!(
                    target_glob = glob.as_str(),
                    "forced source {} matches no translation unit",
                    rule.path.display()
                );
            }
        }

        // Pass 3: link-time symbol requests against whole-index definitions.
        let mut definitions: BTreeMap<&str, Vec<&Path>> = BTreeMap::new();
        for unit in index.translation_units() {
            for symbol in &unit.symbols {
                if unit.exports(&symbol.name) {
                    let owners = definitions.entry(symbol.name.as_str()).or_default();
                    if !owners.contains(&unit.path.as_path()) {
                        owners.push(&unit.path);
                    }
                }
            }
        }

        for file in index.files() {
            for request in file.symbol_requests() {
                let candidates: Vec<&Path> = definitions
                    .get(request.name.as_str())
                    .map(|owners| {
                        owners
                            .iter()
                            .copied()
                            .filter(|p| *p != file.path.as_path())
                            .collect()
                    })
                    .unwrap_or_default();

                let chosen = match candidates.as_slice() {
                    [] => {
                        diagnostics.push(Diagnostic::ExternalLinkAssumption {
                            symbol: request.name.clone(),
                            requested_by: file.path.clone(),
                        });
                        continue;
                    }
                    [only] => *only,
                    many => {
                        let preferred: Vec<&Path> = many
                            .iter()
                            .copied()
                            .filter(|p| forced_files.contains(*p))
                            .collect();
                        if let [winner] = preferred.as_slice() {
                            tracing::debug!(
                                symbol = %request.name,
                                "forced source {} wins over {} other definition(s)",
                                winner.display(),
                                many.len() - 1
                            );
                            *winner
                        } else {
                            ambiguous.push(AmbiguousSymbol {
                                symbol: request.name.clone(),
                                requested_by: file.path.clone(),
                                candidates: many.iter().map(|p| p.to_path_buf()).collect(),
                            });
                            continue;
                        }
                    }
                };

                edges.insert(Edge {
                    from: file.path.clone(),
                    to: chosen.to_path_buf(),
                    kind: EdgeKind::Symbol(request.name.clone()),
                });
            }
        }

        let mut problems = Vec::new();
        if !unresolved.is_empty() {
            unresolved.sort();
            problems.push(Error::UnresolvedInclude(unresolved));
        }
        if !ambiguous.is_empty() {
            ambiguous.sort();
            problems.push(Error::AmbiguousSymbol(ambiguous));
        }
        match problems.len() {
            0 => {}
            1 => return Err(problems.remove(0)),
            _ => return Err(Error::Structural(problems)),
        }

        // BTreeSet order is (from, to, kind), so each list comes out sorted.
        let mut outgoing: BTreeMap<PathBuf, Vec<Edge>> = BTreeMap::new();
        for edge in edges {
            outgoing.entry(edge.from.clone()).or_default().push(edge);
        }

        tracing::info!(
            files = index.len(),
            edges = outgoing.values().map(Vec::len).sum::<usize>(),
            "built dependency graph"
        );

        Ok((
            Self {
                index,
                include_dirs,
                outgoing,
                forced_files,
            },
            diagnostics,
        ))
    }

    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    /// Absolute include search path, in search order.
    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    /// Outgoing edges of `path`, sorted by target path then kind.
    pub fn edges_from(&self, path: &Path) -> &[Edge] {
        self.outgoing.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.outgoing.values().flatten()
    }

    pub fn is_forced(&self, path: &Path) -> bool {
        self.forced_files.contains(path)
    }

    /// Headers a forced rule prepends to `unit` (`-include`), lexical order.
    /// Forced translation units compile on their own and are not listed.
    pub fn forced_headers(&self, unit: &Path) -> Vec<PathBuf> {
        self.edges_from(unit)
            .iter()
            .filter(|e| e.kind == EdgeKind::Forced && !self.is_unit(&e.to))
            .map(|e| e.to.clone())
            .collect()
    }

    /// Files textually pulled into `unit`'s compilation (excluding `unit`):
    /// its includes and forced headers, transitively.
    pub fn compile_closure(&self, unit: &Path) -> BTreeSet<PathBuf> {
        let mut seen: BTreeSet<PathBuf> = self.forced_headers(unit).into_iter().collect();
        let mut stack: Vec<PathBuf> = std::iter::once(unit.to_path_buf())
            .chain(seen.iter().cloned())
            .collect();
        while let Some(current) = stack.pop() {
            for edge in self.edges_from(&current) {
                if edge.kind == EdgeKind::Include
                    && edge.to != unit
                    && seen.insert(edge.to.clone())
                {
                    stack.push(edge.to.clone());
                }
            }
        }
        seen
    }

    fn is_unit(&self, path: &Path) -> bool {
        self.index.get(path).is_some_and(|f| f.is_translation_unit())
    }
}

fn resolve_include(
    index: &SourceIndex,
    from: &SourceFile,
    directive: &IncludeDirective,
    include_dirs: &[PathBuf],
) -> Option<PathBuf> {
    let same_dir = match directive.style {
        IncludeStyle::Quoted => from.path.parent().map(|dir| dir.join(&directive.target)),
        IncludeStyle::Angle => None,
    };
    same_dir
        .into_iter()
        .chain(include_dirs.iter().map(|dir| dir.join(&directive.target)))
        .map(|candidate| normalize_path(&candidate))
        .find(|candidate| index.contains(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/project")
    }

    fn p(rel: &str) -> PathBuf {
        root().join(rel)
    }

    fn build(sources: &[(&str, &str)], rules: &[ForcedInclusionRule]) -> Result<(DependencyGraph, Vec<Diagnostic>)> {
        let (index, _) = SourceIndex::from_sources(&root(), sources);
        DependencyGraph::build(index, rules, &[PathBuf::from("include")])
    }

    fn kinds_from(graph: &DependencyGraph, from: &str) -> Vec<(PathBuf, EdgeKind)> {
        graph
            .edges_from(&p(from))
            .iter()
            .map(|e| (e.to.clone(), e.kind.clone()))
            .collect()
    }

    #[test]
    fn test_same_directory_wins_over_include_path() {
        let (graph, _) = build(
            &[
                ("src/main.cpp", "#include \"config.h\"\n"),
                ("src/config.h", ""),
                ("include/config.h", ""),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(
            kinds_from(&graph, "src/main.cpp"),
            vec![(p("src/config.h"), EdgeKind::Include)]
        );
    }

    #[test]
    fn test_angle_include_searches_include_path_only() {
        let (graph, _) = build(
            &[
                ("src/main.cpp", "#include <config.h>\n#include <Arduino.h>\n"),
                ("src/config.h", ""),
                ("include/config.h", ""),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(
            kinds_from(&graph, "src/main.cpp"),
            vec![(p("include/config.h"), EdgeKind::Include)]
        );
    }

    #[test]
    fn test_relative_parent_include() {
        let (graph, _) = build(
            &[
                ("src/app/main.cpp", "#include \"../shared/util.h\"\n"),
                ("src/shared/util.h", ""),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(graph.edges_from(&p("src/app/main.cpp"))[0].to, p("src/shared/util.h"));
    }

    #[test]
    fn test_unresolved_includes_are_all_reported() {
        let err = build(
            &[
                ("src/main.cpp", "#include \"missing_a.h\"\n#include \"missing_b.h\"\n"),
                ("src/other.cpp", "#include \"missing_c.h\"\n"),
            ],
            &[],
        )
        .unwrap_err();
        match err {
            Error::UnresolvedInclude(list) => assert_eq!(list.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forced_rule_adds_tagged_edge() {
        let rules = vec![ForcedInclusionRule {
            target: "src/*.cpp".to_string(),
            path: PathBuf::from("extra/helper.cpp"),
        }];
        let (graph, _) = build(
            &[
                ("src/main.cpp", ""),
                ("src/nested/deep.cpp", ""),
                ("extra/helper.cpp", ""),
            ],
            &rules,
        )
        .unwrap();
        assert_eq!(
            kinds_from(&graph, "src/main.cpp"),
            vec![(p("extra/helper.cpp"), EdgeKind::Forced)]
        );
        assert!(graph.edges_from(&p("src/nested/deep.cpp")).is_empty());
        assert!(graph.is_forced(&p("extra/helper.cpp")));
    }

    #[test]
    fn test_forced_rule_for_unindexed_file_is_unresolved() {
        let rules = vec![ForcedInclusionRule {
            target: "src/main.cpp".to_string(),
            path: PathBuf::from("extra/gone.cpp"),
        }];
        let err = build(&[("src/main.cpp", "")], &rules).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedInclude(ref list)
                if matches!(list[0], UnresolvedReference::ForcedSource { .. })
        ));
    }

    #[test]
    fn test_symbol_request_resolves_single_definition() {
        let (graph, diags) = build(
            &[
                ("src/main.cpp", "extern \"C\" void nested();\nvoid setup() { nested(); }\n"),
                ("lib/nested.c", "void nested(void) {}\n"),
            ],
            &[],
        )
        .unwrap();
        assert!(diags.is_empty());
        assert_eq!(
            kinds_from(&graph, "src/main.cpp"),
            vec![(p("lib/nested.c"), EdgeKind::Symbol("nested".to_string()))]
        );
    }

    #[test]
    fn test_missing_definition_is_an_assumption_not_an_error() {
        let (_, diags) = build(&[("src/main.cpp", "void from_library();\n")], &[]).unwrap();
        assert_eq!(
            diags,
            vec![Diagnostic::ExternalLinkAssumption {
                symbol: "from_library".to_string(),
                requested_by: p("src/main.cpp"),
            }]
        );
    }

    #[test]
    fn test_static_definitions_are_not_candidates() {
        let (graph, diags) = build(
            &[
                ("src/main.cpp", "void helper();\n"),
                ("src/a.cpp", "static void helper() {}\n"),
                ("src/b.cpp", "void helper() {}\n"),
            ],
            &[],
        )
        .unwrap();
        assert!(diags.is_empty());
        assert_eq!(graph.edges_from(&p("src/main.cpp"))[0].to, p("src/b.cpp"));
    }

    #[test]
    fn test_ambiguous_definitions_list_every_candidate() {
        let err = build(
            &[
                ("src/main.cpp", "void doNothingC();\n"),
                ("lib/c1.cpp", "void doNothingC() {}\n"),
                ("lib/c2.cpp", "void doNothingC() {}\n"),
            ],
            &[],
        )
        .unwrap_err();
        match err {
            Error::AmbiguousSymbol(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].symbol, "doNothingC");
                assert_eq!(list[0].candidates, vec![p("lib/c1.cpp"), p("lib/c2.cpp")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forced_definition_breaks_ambiguity() {
        let rules = vec![ForcedInclusionRule {
            target: "src/main.cpp".to_string(),
            path: PathBuf::from("lib/c2.cpp"),
        }];
        let (graph, _) = build(
            &[
                ("src/main.cpp", "void doNothingC();\n"),
                ("lib/c1.cpp", "void doNothingC() {}\n"),
                ("lib/c2.cpp", "void doNothingC() {}\n"),
            ],
            &rules,
        )
        .unwrap();
        assert!(
            graph
                .edges_from(&p("src/main.cpp"))
                .iter()
                .all(|e| e.to == p("lib/c2.cpp"))
        );
    }

    #[test]
    fn test_unresolved_and_ambiguous_reported_together() {
        let err = build(
            &[
                ("src/main.cpp", "#include \"nope.h\"\nvoid twice();\n"),
                ("src/a.cpp", "void twice() {}\n"),
                ("src/b.cpp", "void twice() {}\n"),
            ],
            &[],
        )
        .unwrap_err();
        match err {
            Error::Structural(problems) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_compile_closure_follows_includes_only() {
        let (graph, _) = build(
            &[
                ("src/main.cpp", "#include \"a.h\"\nvoid other();\n"),
                ("src/a.h", "#include \"b.h\"\n"),
                ("src/b.h", "#include \"a.h\"\n"),
                ("src/other.cpp", "void other() {}\n"),
            ],
            &[],
        )
        .unwrap();
        let closure = graph.compile_closure(&p("src/main.cpp"));
        assert_eq!(closure, BTreeSet::from([p("src/a.h"), p("src/b.h")]));
    }

    #[test]
    fn test_forced_header_joins_compile_closure() {
        let rules = vec![
            ForcedInclusionRule {
                target: "src/main.cpp".to_string(),
                path: PathBuf::from("src/cfg.h"),
            },
            ForcedInclusionRule {
                target: "src/main.cpp".to_string(),
                path: PathBuf::from("src/other.cpp"),
            },
        ];
        let (graph, _) = build(
            &[
                ("src/main.cpp", ""),
                ("src/cfg.h", "#include \"board.h\"\n"),
                ("src/board.h", ""),
                ("src/other.cpp", ""),
            ],
            &rules,
        )
        .unwrap();
        assert_eq!(graph.forced_headers(&p("src/main.cpp")), vec![p("src/cfg.h")]);
        assert_eq!(
            graph.compile_closure(&p("src/main.cpp")),
            BTreeSet::from([p("src/board.h"), p("src/cfg.h")])
        );
    }

    #[test]
    fn test_same_short_name_in_two_namespaces() {
        let (graph, diags) = build(
            &[
                ("src/main.cpp", "#include \"a.h\"\n#include \"c.h\"\n"),
                ("src/a.h", "namespace a { void init(); }\n"),
                ("src/a.cpp", "#include \"a.h\"\nnamespace a { void init() {} }\n"),
                ("src/b.cpp", "namespace b { void init() {} }\n"),
                ("src/c.h", "namespace c { void start(); }\n"),
                ("src/c.cpp", "#include \"c.h\"\nvoid c::start() {}\n"),
            ],
            &[],
        )
        .unwrap();
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(
            kinds_from(&graph, "src/a.h"),
            vec![(p("src/a.cpp"), EdgeKind::Symbol("a::init".to_string()))]
        );
        assert_eq!(
            kinds_from(&graph, "src/c.h"),
            vec![(p("src/c.cpp"), EdgeKind::Symbol("c::start".to_string()))]
        );
    }

    #[test]
    fn test_target_glob() {
        let glob = TargetGlob::new("src/*.cpp").unwrap();
        assert!(glob.matches(Path::new("src/main.cpp")));
        assert!(!glob.matches(Path::new("src/sub/main.cpp")));

        let deep = TargetGlob::new("**/*.ino").unwrap();
        assert!(deep.matches(Path::new("blink.ino")));
        assert!(deep.matches(Path::new("sketches/blink/blink.ino")));

        let one = TargetGlob::new("src/main.c?").unwrap();
        assert!(one.matches(Path::new("src/main.cc")));
        assert!(!one.matches(Path::new("src/main.cpp")));
    }
}
