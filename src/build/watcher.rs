use crate::build::COMPILE_COMMANDS;
use crate::config::{CONFIG_FILE, CxGraphConfig};
use anyhow::{Context, Result};
use colored::*;
use notify::{Config, Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

/// What a rebuild depends on: the source directories, every forced source
/// (which may live outside them) and the configuration file. Build outputs
/// are never relevant, even when they sit inside a watched directory.
#[derive(Debug, Clone)]
pub struct WatchScope {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
    ignored: Vec<PathBuf>,
}

impl WatchScope {
    pub fn new(project_root: &Path, config: &CxGraphConfig) -> Self {
        let dirs = config
            .project
            .src_dirs
            .iter()
            .map(|dir| project_root.join(dir))
            .collect();
        let mut files = vec![project_root.join(CONFIG_FILE)];
        files.extend(config.forced_sources.iter().map(|r| project_root.join(&r.path)));
        let ignored = vec![
            project_root.join(&config.build.build_dir),
            project_root.join(COMPILE_COMMANDS),
        ];
        Self {
            dirs,
            files,
            ignored,
        }
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        // Also skips creation of the build directory's parents (`.cxg`).
        if self
            .ignored
            .iter()
            .any(|ignored| path.starts_with(ignored) || ignored.starts_with(path))
        {
            return false;
        }
        self.files.iter().any(|f| f == path) || self.dirs.iter().any(|d| path.starts_with(d))
    }

    /// Directories handed to the watcher. Single files are watched through
    /// their parent so editors that replace files on save are still seen.
    fn targets(&self) -> Vec<(PathBuf, RecursiveMode)> {
        let mut targets: Vec<(PathBuf, RecursiveMode)> = self
            .dirs
            .iter()
            .map(|d| (d.clone(), RecursiveMode::Recursive))
            .collect();
        for file in &self.files {
            let Some(parent) = file.parent() else {
                continue;
            };
            let covered = self.dirs.iter().any(|d| parent.starts_with(d))
                || targets.iter().any(|(t, _)| t == parent);
            if !covered {
                targets.push((parent.to_path_buf(), RecursiveMode::NonRecursive));
            }
        }
        targets
    }
}

/// Runs `rebuild` once, then again after every burst of relevant changes.
/// Returns when the watcher channel closes.
pub fn watch(project_root: &Path, config: &CxGraphConfig, mut rebuild: impl FnMut()) -> Result<()> {
    let project_root = project_root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", project_root.display()))?;
    let scope = WatchScope::new(&project_root, config);

    let (tx, rx) = channel::<notify::Result<Event>>();
    let config_notify = Config::default().with_poll_interval(Duration::from_secs(1));
    let mut watcher = notify::RecommendedWatcher::new(tx, config_notify)?;

    for (path, mode) in scope.targets() {
        watcher
            .watch(&path, mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        let shown = path.strip_prefix(&project_root).unwrap_or(&path);
        println!("{} Watching for changes in {}...", "👀".cyan(), shown.display());
    }

    rebuild();

    let relevant = |event: notify::Result<Event>| match event {
        Ok(event) => event.paths.iter().any(|p| scope.is_relevant(p)),
        Err(e) => {
            tracing::warn!("watch error: {}", e);
            false
        }
    };

    while let Ok(event) = rx.recv() {
        if !relevant(event) {
            continue;
        }
        // Debounce editors that write several times per save.
        std::thread::sleep(Duration::from_millis(100));
        while rx.try_recv().is_ok() {}
        print!("\x1B[2J\x1B[1;1H");
        println!("{} File changed. Rebuilding...", "🔄".yellow());
        rebuild();
    }
    Ok(())
}
