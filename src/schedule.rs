//! Incremental Build Scheduler.
//!
//! Decides which translation units of a build set must be recompiled and in
//! what order. A unit is fresh only if the fingerprint cache holds an entry
//! whose source hash and compile-closure hashes all match the index.
//! Symbol edges never make a unit stale: a changed definition elsewhere only
//! forces a relink.

use crate::fingerprint::{CacheEntry, FingerprintCache};
use crate::graph::DependencyGraph;
use crate::index::Fingerprint;
use crate::resolve::BuildSet;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NoCacheEntry,
    SourceChanged,
    DependencyChanged(PathBuf),
    DependencySetChanged,
    ObjectMissing,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NoCacheEntry => write!(f, "never built"),
            StaleReason::SourceChanged => write!(f, "source changed"),
            StaleReason::DependencyChanged(path) => write!(f, "{} changed", path.display()),
            StaleReason::DependencySetChanged => write!(f, "included files changed"),
            StaleReason::ObjectMissing => write!(f, "object file missing"),
        }
    }
}

/// Where compile outputs go.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub build_dir: PathBuf,
    pub binary_name: String,
}

impl OutputLayout {
    pub fn new(build_dir: impl Into<PathBuf>, binary_name: impl Into<String>) -> Self {
        Self {
            build_dir: build_dir.into(),
            binary_name: binary_name.into(),
        }
    }

    /// `<build_dir>/obj/<relative source path>.o`, so `a/x.cpp` and
    /// `b/x.cpp` never collide.
    pub fn object_path(&self, relative: &Path) -> PathBuf {
        let mut object = self.build_dir.join("obj");
        for component in relative.components() {
            if let Component::Normal(part) = component {
                object.push(part);
            }
        }
        let mut name = object.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".o");
        object.set_file_name(name);
        object
    }

    pub fn binary_path(&self) -> PathBuf {
        self.build_dir.join(&self.binary_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub unit: PathBuf,
    pub object: PathBuf,
    pub fingerprint: Fingerprint,
    /// Headers passed to the compiler with `-include`.
    pub forced_headers: Vec<PathBuf>,
    /// Current compile closure, header -> content hash.
    pub closure: BTreeMap<PathBuf, Fingerprint>,
    pub stale: Option<StaleReason>,
}

impl PlanEntry {
    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }

    /// Cache entry describing a successful compile of this unit.
    pub fn cache_entry(&self) -> CacheEntry {
        CacheEntry::new(
            self.fingerprint.as_str(),
            self.closure
                .iter()
                .map(|(path, hash)| (path.clone(), hash.as_str().to_string()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStep {
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
}

impl LinkStep {
    /// Identity of the link inputs. A binary linked from a different object
    /// set is out of date even when every object is fresh.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut text = String::new();
        for object in &self.objects {
            text.push_str(&object.to_string_lossy());
            text.push('\n');
        }
        text.push_str(&self.output.to_string_lossy());
        Fingerprint::of_bytes(text.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilePlan {
    /// Every unit of the build set, lexical order.
    pub entries: Vec<PlanEntry>,
    /// Stale units grouped into levels; a unit only depends on units of
    /// earlier waves.
    pub waves: Vec<Vec<PathBuf>>,
    pub link: LinkStep,
    /// Structural unit-to-unit dependencies, used to rebuild waves.
    unit_deps: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl CompilePlan {
    pub fn entry(&self, unit: &Path) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.unit == unit)
    }

    pub fn stale(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.is_stale())
    }

    pub fn stale_count(&self) -> usize {
        self.stale().count()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.waves.is_empty()
    }

    /// Marks a fresh unit stale (e.g. its object vanished) and reschedules.
    /// Units that are already stale keep their original reason.
    pub fn force_stale(&mut self, unit: &Path, reason: StaleReason) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.unit == unit)
            && entry.stale.is_none()
        {
            tracing::debug!(unit = %unit.display(), %reason, "forcing recompile");
            entry.stale = Some(reason);
            self.waves = compute_waves(&self.entries, &self.unit_deps);
        }
    }

    /// Applies [`StaleReason::ObjectMissing`] to every fresh unit whose object
    /// is not on disk.
    pub fn mark_missing_objects(&mut self) {
        let missing: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|e| !e.is_stale() && !e.object.exists())
            .map(|e| e.unit.clone())
            .collect();
        for unit in missing {
            self.force_stale(&unit, StaleReason::ObjectMissing);
        }
    }
}

pub fn plan(
    graph: &DependencyGraph,
    build_set: &BuildSet,
    cache: &FingerprintCache,
    layout: &OutputLayout,
) -> CompilePlan {
    let index = graph.index();
    let units = build_set.translation_units(graph);

    let mut entries = Vec::with_capacity(units.len());
    for unit in &units {
        let Some(file) = index.get(unit) else {
            continue;
        };
        let closure: BTreeMap<PathBuf, Fingerprint> = graph
            .compile_closure(unit)
            .into_iter()
            .filter_map(|dep| index.get(&dep).map(|f| (dep, f.fingerprint.clone())))
            .collect();
        let stale = staleness(&file.fingerprint, &closure, cache.entry(unit).as_ref());
        if let Some(reason) = &stale {
            tracing::debug!(unit = %unit.display(), %reason, "stale");
        }
        entries.push(PlanEntry {
            unit: unit.clone(),
            object: layout.object_path(index.relative(unit)),
            fingerprint: file.fingerprint.clone(),
            forced_headers: graph.forced_headers(unit),
            closure,
            stale,
        });
    }

    let unit_set: BTreeSet<&Path> = units.iter().map(PathBuf::as_path).collect();
    let unit_deps: BTreeMap<PathBuf, BTreeSet<PathBuf>> = units
        .iter()
        .map(|unit| (unit.clone(), structural_unit_deps(graph, unit, &unit_set)))
        .collect();

    let waves = compute_waves(&entries, &unit_deps);
    let link = LinkStep {
        objects: entries.iter().map(|e| e.object.clone()).collect(),
        output: layout.binary_path(),
    };

    tracing::info!(
        units = entries.len(),
        stale = entries.iter().filter(|e| e.is_stale()).count(),
        waves = waves.len(),
        "planned build"
    );
    CompilePlan {
        entries,
        waves,
        link,
        unit_deps,
    }
}

fn staleness(
    source: &Fingerprint,
    closure: &BTreeMap<PathBuf, Fingerprint>,
    cached: Option<&CacheEntry>,
) -> Option<StaleReason> {
    let Some(cached) = cached else {
        return Some(StaleReason::NoCacheEntry);
    };
    if cached.hash != source.as_str() {
        return Some(StaleReason::SourceChanged);
    }
    if !closure.keys().eq(cached.deps.keys()) {
        return Some(StaleReason::DependencySetChanged);
    }
    closure
        .iter()
        .find(|(path, hash)| cached.deps.get(*path).map(String::as_str) != Some(hash.as_str()))
        .map(|(path, _)| StaleReason::DependencyChanged(path.clone()))
}

/// Units reachable from `unit` over include/forced edges, walking through
/// headers but stopping at the first unit on each path.
fn structural_unit_deps(
    graph: &DependencyGraph,
    unit: &Path,
    units: &BTreeSet<&Path>,
) -> BTreeSet<PathBuf> {
    let mut deps = BTreeSet::new();
    let mut seen = BTreeSet::from([unit.to_path_buf()]);
    let mut stack = vec![unit.to_path_buf()];
    while let Some(current) = stack.pop() {
        for edge in graph.edges_from(&current) {
            if !edge.kind.is_structural() || !seen.insert(edge.to.clone()) {
                continue;
            }
            if units.contains(edge.to.as_path()) {
                deps.insert(edge.to.clone());
            } else {
                stack.push(edge.to.clone());
            }
        }
    }
    deps
}

fn compute_waves(
    entries: &[PlanEntry],
    unit_deps: &BTreeMap<PathBuf, BTreeSet<PathBuf>>,
) -> Vec<Vec<PathBuf>> {
    let mut pending: BTreeSet<&Path> = entries
        .iter()
        .filter(|e| e.is_stale())
        .map(|e| e.unit.as_path())
        .collect();
    let mut waves = Vec::new();

    while !pending.is_empty() {
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|unit| {
                unit_deps
                    .get(**unit)
                    .is_none_or(|deps| deps.iter().all(|d| !pending.contains(d.as_path())))
            })
            .map(|unit| unit.to_path_buf())
            .collect();

        if ready.is_empty() {
            // Unit cycles are rejected by the resolver; keep going regardless.
            waves.push(pending.iter().map(|u| u.to_path_buf()).collect());
            break;
        }
        for unit in &ready {
            pending.remove(unit.as_path());
        }
        waves.push(ready);
    }
    waves
}
