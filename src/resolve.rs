//! Build Set Resolver.
//!
//! Breadth-first reachability from the root translation units over every
//! edge kind. Each file remembers the first edge that reached it, which is
//! what `cxg tree` prints.

use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, Edge};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Root,
    Reached(Edge),
}

/// The closed set of files needed to build the roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSet {
    roots: Vec<PathBuf>,
    order: Vec<PathBuf>,
    reasons: BTreeMap<PathBuf, Reason>,
}

impl BuildSet {
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Files in discovery order (breadth-first, lexical tie-break).
    pub fn files(&self) -> &[PathBuf] {
        &self.order
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.reasons.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn reason(&self, path: &Path) -> Option<&Reason> {
        self.reasons.get(path)
    }

    /// Translation units of the set in lexical order.
    pub fn translation_units(&self, graph: &DependencyGraph) -> Vec<PathBuf> {
        self.reasons
            .keys()
            .filter(|p| {
                graph
                    .index()
                    .get(p)
                    .is_some_and(|f| f.is_translation_unit())
            })
            .cloned()
            .collect()
    }
}

pub fn resolve(graph: &DependencyGraph, roots: &[PathBuf]) -> Result<BuildSet> {
    let mut sorted_roots: Vec<PathBuf> = roots.iter().map(|r| graph.index().absolute(r)).collect();
    sorted_roots.sort();
    sorted_roots.dedup();

    for root in &sorted_roots {
        match graph.index().get(root) {
            Some(file) if file.is_translation_unit() => {}
            _ => return Err(Error::UnknownRoot(root.clone())),
        }
    }

    let mut reasons: BTreeMap<PathBuf, Reason> = BTreeMap::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    for root in &sorted_roots {
        reasons.insert(root.clone(), Reason::Root);
        order.push(root.clone());
        queue.push_back(root.clone());
    }

    while let Some(current) = queue.pop_front() {
        for edge in graph.edges_from(&current) {
            if !reasons.contains_key(&edge.to) {
                reasons.insert(edge.to.clone(), Reason::Reached(edge.clone()));
                order.push(edge.to.clone());
                queue.push_back(edge.to.clone());
            }
        }
    }

    let members: BTreeSet<&Path> = order.iter().map(PathBuf::as_path).collect();
    if let Some(path) = find_unit_cycle(graph, &members) {
        return Err(Error::Cycle { path });
    }

    tracing::info!(
        roots = sorted_roots.len(),
        files = order.len(),
        "resolved build set"
    );
    Ok(BuildSet {
        roots: sorted_roots,
        order,
        reasons,
    })
}

/// First structural cycle (include/forced edges) that passes through a
/// translation unit, as an ordered path whose last element repeats the first.
/// Cycles made only of headers are harmless and ignored.
fn find_unit_cycle(graph: &DependencyGraph, members: &BTreeSet<&Path>) -> Option<Vec<PathBuf>> {
    let units = members.iter().filter(|p| {
        graph
            .index()
            .get(p)
            .is_some_and(|f| f.is_translation_unit())
    });

    for &unit in units {
        let mut parent: HashMap<&Path, &Path> = HashMap::new();
        let mut queue = VecDeque::from([unit]);
        let mut visited: BTreeSet<&Path> = BTreeSet::from([unit]);

        while let Some(current) = queue.pop_front() {
            for edge in graph.edges_from(current) {
                if !edge.kind.is_structural() || !members.contains(edge.to.as_path()) {
                    continue;
                }
                if edge.to == unit {
                    let mut path = vec![unit.to_path_buf()];
                    let mut step = current;
                    let mut back = vec![current.to_path_buf()];
                    while step != unit {
                        step = parent[step];
                        back.push(step.to_path_buf());
                    }
                    back.pop();
                    back.reverse();
                    path.extend(back);
                    path.push(unit.to_path_buf());
                    return Some(path);
                }
                if visited.insert(edge.to.as_path()) {
                    parent.insert(edge.to.as_path(), current);
                    queue.push_back(edge.to.as_path());
                }
            }
        }
    }
    None
}
