use crate::config::CxGraphConfig;
use crate::diagnostics::Reporter;
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintCache;
use crate::graph::DependencyGraph;
use crate::index::{ScanOptions, SourceIndex};
use crate::resolve::{BuildSet, resolve};
use crate::schedule::{CompilePlan, OutputLayout, plan};
use crate::toolchain::Toolchain;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Cooperative cancellation shared with signal handlers. Checked before every
/// compile dispatch and before linking.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything needed to plan a build: the indexed project, its graph and the
/// resolved build set.
#[derive(Debug)]
pub struct Pipeline {
    pub config: CxGraphConfig,
    pub graph: DependencyGraph,
    pub build_set: BuildSet,
}

impl Pipeline {
    /// Scans, builds the graph and resolves the build set. Non-fatal
    /// diagnostics go to `reporter`.
    pub fn load(
        project_root: &Path,
        config: CxGraphConfig,
        reporter: &dyn Reporter,
    ) -> Result<Self> {
        let start = Instant::now();
        let options = ScanOptions {
            skip_dirs: vec![config.build.build_dir.clone()],
            extra_files: config
                .forced_sources
                .iter()
                .map(|rule| rule.path.clone())
                .collect(),
        };
        let (index, diagnostics) =
            SourceIndex::scan(project_root, &config.project.src_dirs, &options)?;
        reporter.report_all(&diagnostics);

        let (graph, diagnostics) = DependencyGraph::build(
            index,
            &config.forced_sources,
            &config.build.extra_include_dirs,
        )?;
        reporter.report_all(&diagnostics);

        let roots = if config.project.roots.is_empty() {
            default_roots(graph.index())
        } else {
            config.project.roots.clone()
        };
        if roots.is_empty() {
            return Err(Error::Config {
                reason: "no roots configured and no main.* or *.ino file found".to_string(),
            });
        }
        let build_set = resolve(&graph, &roots)?;

        tracing::debug!(elapsed = ?start.elapsed(), "pipeline ready");
        Ok(Self {
            config,
            graph,
            build_set,
        })
    }

    pub fn project_root(&self) -> &Path {
        self.graph.index().project_root()
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(
            self.graph.index().absolute(&self.config.build.build_dir),
            self.config.bin_name(),
        )
    }

    pub fn include_paths(&self) -> &[PathBuf] {
        self.graph.include_dirs()
    }

    pub fn load_cache(&self) -> FingerprintCache {
        FingerprintCache::load(&self.layout().build_dir)
    }

    pub fn plan(&self, cache: &FingerprintCache) -> CompilePlan {
        plan(&self.graph, &self.build_set, cache, &self.layout())
    }
}

/// Translation units named `main.*` plus every Arduino sketch.
pub fn default_roots(index: &SourceIndex) -> Vec<PathBuf> {
    index
        .translation_units()
        .filter(|unit| {
            let stem = unit.path.file_stem().map(|s| s.to_string_lossy());
            let ext = unit.path.extension().map(|e| e.to_string_lossy());
            stem.as_deref() == Some("main") || ext.as_deref() == Some("ino")
        })
        .map(|unit| unit.path.clone())
        .collect()
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub compiled: Vec<PathBuf>,
    /// Compiler output of units that built with warnings.
    pub warnings: Vec<(PathBuf, String)>,
    pub linked: bool,
}

/// Runs the compile waves of `plan` on at most `concurrency` workers, then
/// links. The first failure stops new dispatches; units already compiling
/// finish and keep their cache entries.
pub fn execute(
    plan: &mut CompilePlan,
    toolchain: &dyn Toolchain,
    include_paths: &[PathBuf],
    cache: &FingerprintCache,
    concurrency: usize,
    cancel: &CancelToken,
) -> Result<BuildReport> {
    plan.mark_missing_objects();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .map_err(|e| Error::Config {
            reason: format!("could not start {} compile workers: {}", concurrency, e),
        })?;

    let pb = ProgressBar::new(plan.stale_count() as u64);
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Compiling...");

    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<Error>> = Mutex::new(None);
    let report = Mutex::new(BuildReport::default());

    let fail = |error: Error| {
        failed.store(true, Ordering::SeqCst);
        let mut slot = first_error.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(error);
        }
    };

    for wave in &plan.waves {
        pool.install(|| {
            wave.par_iter().for_each(|unit| {
                if failed.load(Ordering::SeqCst) || cancel.is_cancelled() {
                    return;
                }
                let Some(entry) = plan.entry(unit) else {
                    return;
                };

                if let Some(missing) = entry.closure.keys().find(|dep| !dep.exists()) {
                    fail(Error::MissingDependency {
                        unit: unit.clone(),
                        missing: missing.clone(),
                    });
                    return;
                }
                if let Some(dir) = entry.object.parent()
                    && let Err(e) = fs::create_dir_all(dir)
                {
                    fail(Error::io(dir, e));
                    return;
                }

                pb.set_message(format!("Compiling {}", display_name(unit)));
                let compiled =
                    toolchain.compile(unit, include_paths, &entry.forced_headers, &entry.object);
                match compiled {
                    Ok(warnings) => {
                        if let Err(e) = cache.record(unit, entry.cache_entry()) {
                            fail(e);
                            return;
                        }
                        let mut report = report.lock().unwrap_or_else(|p| p.into_inner());
                        report.compiled.push(unit.clone());
                        if !warnings.trim().is_empty() {
                            report.warnings.push((unit.clone(), warnings));
                        }
                        pb.inc(1);
                    }
                    Err(e) => fail(Error::Compile {
                        path: unit.clone(),
                        message: e.output(),
                    }),
                }
            });
        });

        if failed.load(Ordering::SeqCst) || cancel.is_cancelled() {
            break;
        }
    }

    if let Some(error) = first_error.into_inner().unwrap_or_else(|p| p.into_inner()) {
        pb.abandon_with_message("Compilation failed");
        return Err(error);
    }
    if cancel.is_cancelled() {
        pb.abandon_with_message("Cancelled");
        return Err(Error::Cancelled);
    }
    pb.finish_and_clear();

    let mut report = report.into_inner().unwrap_or_else(|p| p.into_inner());
    report.compiled.sort();

    let link_fingerprint = plan.link.fingerprint();
    let same_objects = cache.link_fingerprint().as_deref() == Some(link_fingerprint.as_str());
    if report.compiled.is_empty()
        && same_objects
        && !needs_link(&plan.link.objects, &plan.link.output)
    {
        return Ok(report);
    }
    if let Some(dir) = plan.link.output.parent() {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    toolchain
        .link(&plan.link.objects, &plan.link.output)
        .map_err(|e| Error::Link {
            message: e.output(),
        })?;
    cache.record_link(link_fingerprint.as_str())?;
    report.linked = true;
    tracing::info!(
        compiled = report.compiled.len(),
        output = %plan.link.output.display(),
        "build finished"
    );
    Ok(report)
}

/// Relink when the binary is missing or older than any object. A changed
/// object set is caught by the link fingerprint instead.
fn needs_link(objects: &[PathBuf], output: &Path) -> bool {
    let Ok(bin_time) = fs::metadata(output).and_then(|m| m.modified()) else {
        return true;
    };
    objects.iter().any(|obj| {
        fs::metadata(obj)
            .and_then(|m| m.modified())
            .map_or(true, |t| t > bin_time)
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
