//! Build set visualization.
//!
//! This module backs `cxg tree`, which shows every file of the build set
//! under the file that first pulled it in, and why.
//!
//! ## Example Output
//!
//! ```text
//! src/main.cpp
//! ├── src/nothingA.h (included)
//! ├── src/nothingB.h (included)
//! └── lib/nested.c (defines `nested`)
//! ```

use crate::graph::DependencyGraph;
use crate::resolve::{BuildSet, Reason};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub fn render_tree(graph: &DependencyGraph, build_set: &BuildSet) -> String {
    let mut children: BTreeMap<&Path, Vec<&PathBuf>> = BTreeMap::new();
    for file in build_set.files() {
        if let Some(Reason::Reached(edge)) = build_set.reason(file) {
            children.entry(edge.from.as_path()).or_default().push(file);
        }
    }

    let mut out = String::new();
    for root in build_set.roots() {
        let _ = writeln!(out, "{}", graph.index().relative(root).display());
        render_children(graph, build_set, &children, root, "", &mut out);
    }
    out
}

fn render_children(
    graph: &DependencyGraph,
    build_set: &BuildSet,
    children: &BTreeMap<&Path, Vec<&PathBuf>>,
    parent: &Path,
    indent: &str,
    out: &mut String,
) {
    let Some(kids) = children.get(parent) else {
        return;
    };
    let count = kids.len();
    for (i, child) in kids.iter().enumerate() {
        let is_last = i == count - 1;
        let prefix = if is_last { "└──" } else { "├──" };
        let why = match build_set.reason(child) {
            Some(Reason::Reached(edge)) => edge.kind.to_string(),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "{}{} {} ({})",
            indent,
            prefix,
            graph.index().relative(child).display(),
            why
        );
        let next = format!("{}{}", indent, if is_last { "    " } else { "│   " });
        render_children(graph, build_set, children, child, &next, out);
    }
}
