//! Directive and symbol extraction for a single C/C++ source file.
//!
//! This is not a preprocessor. Comments are removed, `#include` lines are
//! read verbatim and every conditional branch is kept. What remains is scanned
//! for top-level function declarations and definitions so that link-time
//! references can be matched across files.

use regex::Regex;
use std::sync::LazyLock;

static INCLUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#\s*include\b\s*(.*)$").unwrap());
static INCLUDE_TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(?:"([^"]+)"|<([^>]+)>)"#).unwrap());
static ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__attribute__\s*\(\([^()]*(?:\([^()]*\)[^()]*)*\)\)").unwrap());
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<prefix>[^()=;{}]*?[\s*&])(?P<name>(?:[A-Za-z_]\w*::)*~?[A-Za-z_]\w*)\s*\((?P<params>[^()]*(?:\([^()]*\)[^()]*)*)\)(?:\s*(?:const|noexcept|override|final|volatile|&&|&))*\s*(?:->\s*[^;{()]+)?$",
    )
    .unwrap()
});
static EXTERN_C_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bextern\s*"C""#).unwrap());
static STATIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bstatic\b").unwrap());
static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(inline\s+)?namespace(?:\s+([A-Za-z_][\w:]*))?$").unwrap());

const NON_FUNCTION_NAMES: &[&str] = &[
    "if",
    "for",
    "while",
    "switch",
    "catch",
    "return",
    "sizeof",
    "alignof",
    "decltype",
    "static_assert",
    "defined",
    "__attribute__",
    "__declspec",
];

const NON_DECLARATION_PREFIXES: &[&str] = &[
    "return", "typedef", "using", "else", "case", "goto", "throw", "new", "delete", "friend",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IncludeStyle {
    /// `#include "file.h"`
    Quoted,
    /// `#include <file.h>`
    Angle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub target: String,
    pub style: IncludeStyle,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Linkage {
    /// `static` or inside an anonymous namespace.
    Internal,
    /// Plain C++ linkage.
    External,
    /// Declared or defined under `extern "C"`.
    ExternalC,
}

impl Linkage {
    pub fn is_external(self) -> bool {
        !matches!(self, Linkage::Internal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolRole {
    Declared,
    Defined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Namespace-qualified (`app::init`) unless the symbol has C linkage.
    pub name: String,
    pub linkage: Linkage,
    pub role: SymbolRole,
    pub line: usize,
}

/// Everything extracted from one file, plus the lines that could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSource {
    pub includes: Vec<IncludeDirective>,
    pub symbols: Vec<Symbol>,
    pub errors: Vec<(usize, String)>,
}

pub fn parse_source(text: &str) -> ParsedSource {
    let stripped = strip_comments(text);
    let mut parsed = ParsedSource::default();
    let code = read_directives(&stripped, &mut parsed);
    // A file with an unreadable directive contributes no include edges at all.
    if !parsed.errors.is_empty() {
        parsed.includes.clear();
    }
    scan_declarations(&code, &mut parsed);
    parsed
}

/// Replaces comments with spaces, keeping newlines and string literals.
fn strip_comments(text: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str,
        Char,
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut state = State::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match state {
            State::Code => match (c, next) {
                ('/', Some('/')) => {
                    state = State::LineComment;
                    out.push_str("  ");
                    i += 1;
                }
                ('/', Some('*')) => {
                    state = State::BlockComment;
                    out.push_str("  ");
                    i += 1;
                }
                ('"', _) => {
                    state = State::Str;
                    out.push(c);
                }
                ('\'', _) if !is_digit_separator(&chars, i) => {
                    state = State::Char;
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = State::Code;
                    out.push_str("  ");
                    i += 1;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::Str | State::Char => {
                out.push(c);
                let quote = if state == State::Str { '"' } else { '\'' };
                if c == '\\' {
                    if let Some(n) = next {
                        out.push(n);
                        i += 1;
                    }
                } else if c == quote || c == '\n' {
                    state = State::Code;
                }
            }
        }
        i += 1;
    }
    out
}

// 1'000'000 in C++14 is a number, not a character literal.
fn is_digit_separator(chars: &[char], i: usize) -> bool {
    i > 0
        && chars[i - 1].is_ascii_alphanumeric()
        && chars.get(i + 1).is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.get(i + 2) != Some(&'\'')
}

/// Records `#include` directives and blanks every preprocessor line
/// (including continuations) out of the returned code.
fn read_directives(text: &str, parsed: &mut ParsedSource) -> String {
    let mut code = String::with_capacity(text.len());
    let mut continuation = false;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start();
        let is_directive = continuation || trimmed.starts_with('#');
        continuation = is_directive && line.trim_end().ends_with('\\');

        if !is_directive {
            code.push_str(line);
            code.push('\n');
            continue;
        }
        code.push('\n');

        let Some(caps) = INCLUDE_RE.captures(line) else {
            continue;
        };
        let rest = caps.get(1).map_or("", |m| m.as_str()).trim();
        match INCLUDE_TARGET_RE.captures(rest) {
            Some(target) => {
                let (value, style) = match (target.get(1), target.get(2)) {
                    (Some(q), _) => (q.as_str(), IncludeStyle::Quoted),
                    (None, Some(a)) => (a.as_str(), IncludeStyle::Angle),
                    (None, None) => continue,
                };
                parsed.includes.push(IncludeDirective {
                    target: value.trim().to_string(),
                    style,
                    line: line_no,
                });
            }
            None => parsed.errors.push((
                line_no,
                format!("malformed #include directive: `{}`", trimmed.trim_end()),
            )),
        }
    }
    code
}

#[derive(Debug, Clone, PartialEq)]
enum Scope {
    ExternC,
    /// `name` is `None` for an anonymous namespace.
    Namespace { name: Option<String>, inline: bool },
    Block,
}

/// Walks the directive-free code and records top-level function shapes.
fn scan_declarations(code: &str, parsed: &mut ParsedSource) {
    let mut scopes: Vec<Scope> = Vec::new();
    let mut statement = String::new();
    let mut statement_line = 0;
    let mut line = 1;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        let top_level = scopes.iter().all(|s| !matches!(s, Scope::Block));
        match c {
            '\n' => {
                line += 1;
                if top_level {
                    statement.push(' ');
                }
            }
            '"' | '\'' => {
                // Literals are kept whole so braces and semicolons inside them are inert.
                if top_level {
                    statement.push(c);
                }
                while let Some(n) = chars.next() {
                    if top_level {
                        statement.push(n);
                    }
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            if top_level {
                                statement.push(escaped);
                            }
                        }
                    } else if n == c {
                        break;
                    } else if n == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            ';' => {
                if top_level {
                    record_function(&statement, statement_line, SymbolRole::Declared, &scopes, parsed);
                }
                statement.clear();
            }
            '{' => {
                let scope = if top_level {
                    open_scope(&statement, statement_line, &scopes, parsed)
                } else {
                    Scope::Block
                };
                scopes.push(scope);
                statement.clear();
            }
            '}' => {
                scopes.pop();
                statement.clear();
            }
            _ => {
                if top_level {
                    if statement.trim().is_empty() && !c.is_whitespace() {
                        statement_line = line;
                    }
                    statement.push(c);
                }
            }
        }
    }
}

fn open_scope(statement: &str, line: usize, scopes: &[Scope], parsed: &mut ParsedSource) -> Scope {
    let normalized = normalize(statement);
    if EXTERN_C_RE.is_match(&normalized) && EXTERN_C_RE.replace(&normalized, "").trim().is_empty() {
        return Scope::ExternC;
    }
    if let Some(caps) = NAMESPACE_RE.captures(&normalized) {
        return Scope::Namespace {
            name: caps.get(2).map(|m| m.as_str().to_string()),
            inline: caps.get(1).is_some(),
        };
    }
    record_function(statement, line, SymbolRole::Defined, scopes, parsed);
    Scope::Block
}

fn record_function(
    statement: &str,
    line: usize,
    role: SymbolRole,
    scopes: &[Scope],
    parsed: &mut ParsedSource,
) {
    let normalized = normalize(statement);
    if normalized.is_empty() {
        return;
    }
    let cleaned = ATTRIBUTE_RE.replace_all(&normalized, " ");
    let cleaned = normalize(&cleaned);
    let Some(caps) = FUNCTION_RE.captures(&cleaned) else {
        return;
    };
    let prefix = caps["prefix"].trim();
    let name = &caps["name"];

    let first_word = prefix.split_whitespace().next().unwrap_or("");
    if NON_DECLARATION_PREFIXES.contains(&first_word)
        || !prefix.chars().any(|c| c.is_alphanumeric() || c == '_')
    {
        return;
    }
    let short_name = name.rsplit("::").next().unwrap_or(name);
    if NON_FUNCTION_NAMES.contains(&short_name) {
        return;
    }

    let in_anonymous_namespace = scopes
        .iter()
        .any(|s| matches!(s, Scope::Namespace { name: None, .. }));
    let linkage = if STATIC_RE.is_match(prefix) || in_anonymous_namespace {
        Linkage::Internal
    } else if EXTERN_C_RE.is_match(prefix) || scopes.contains(&Scope::ExternC) {
        Linkage::ExternalC
    } else {
        Linkage::External
    };

    // C linkage ignores namespaces; inline namespaces are transparent.
    let qualified = if linkage == Linkage::ExternalC {
        short_name.to_string()
    } else {
        let mut parts: Vec<&str> = scopes
            .iter()
            .filter_map(|s| match s {
                Scope::Namespace {
                    name: Some(ns),
                    inline: false,
                } => Some(ns.as_str()),
                _ => None,
            })
            .collect();
        parts.push(name);
        parts.join("::")
    };

    parsed.symbols.push(Symbol {
        name: qualified,
        linkage,
        role,
        line,
    });
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
