//! Durable fingerprint cache.
//!
//! Stored as `fingerprints.json` in the build directory. Each translation unit
//! that compiled successfully has one entry: its own content hash plus the
//! hash of every header in its compile closure at that moment.
//!
//! The file also remembers which object set the current binary was linked
//! from, so dropping a unit from the build forces a relink.
//!
//! Loading is fail-safe: a missing, corrupt or incompatible file yields an
//! empty cache, so everything is considered stale. Writes replace the whole
//! file through a temporary sibling and a rename, one entry at a time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

pub const CACHE_FILE: &str = "fingerprints.json";

/// Bumped whenever the on-disk layout changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content hash of the translation unit when it was compiled.
    pub hash: String,
    /// Unix seconds.
    pub built_at: u64,
    /// Compile closure at build time, header -> content hash.
    #[serde(default)]
    pub deps: BTreeMap<PathBuf, String>,
}

impl CacheEntry {
    pub fn new(hash: impl Into<String>, deps: BTreeMap<PathBuf, String>) -> Self {
        let built_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            hash: hash.into(),
            built_at,
            deps,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<PathBuf, CacheEntry>,
    /// Fingerprint of the object set of the last successful link.
    #[serde(default)]
    link: Option<String>,
}

impl CacheFile {
    fn empty() -> Self {
        Self {
            version: FORMAT_VERSION,
            entries: BTreeMap::new(),
            link: None,
        }
    }
}

#[derive(Debug)]
pub struct FingerprintCache {
    /// `None` keeps the cache in memory only.
    file: Option<PathBuf>,
    state: Mutex<CacheFile>,
}

impl FingerprintCache {
    pub fn load(build_dir: &Path) -> Self {
        let file = build_dir.join(CACHE_FILE);
        let state = match fs::read_to_string(&file) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(cache) if cache.version == FORMAT_VERSION => cache,
                Ok(cache) => {
                    tracing::warn!(
                        found = cache.version,
                        expected = FORMAT_VERSION,
                        "ignoring fingerprint cache from another format version"
                    );
                    CacheFile::empty()
                }
                Err(e) => {
                    tracing::warn!("ignoring unreadable fingerprint cache: {}", e);
                    CacheFile::empty()
                }
            },
            Err(_) => CacheFile::empty(),
        };
        tracing::debug!(entries = state.entries.len(), file = %file.display(), "loaded fingerprint cache");
        Self {
            file: Some(file),
            state: Mutex::new(state),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            file: None,
            state: Mutex::new(CacheFile::empty()),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn entry(&self, unit: &Path) -> Option<CacheEntry> {
        self.lock().entries.get(unit).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Stores `entry` for `unit` and persists the whole cache atomically.
    /// Concurrent callers are serialized so each write sees every earlier one.
    pub fn record(&self, unit: &Path, entry: CacheEntry) -> Result<()> {
        let mut state = self.lock();
        state.entries.insert(unit.to_path_buf(), entry);
        self.persist(&state)
    }

    /// Fingerprint of the object set the current binary was linked from.
    pub fn link_fingerprint(&self) -> Option<String> {
        self.lock().link.clone()
    }

    pub fn record_link(&self, fingerprint: &str) -> Result<()> {
        let mut state = self.lock();
        state.link = Some(fingerprint.to_string());
        self.persist(&state)
    }

    fn persist(&self, state: &CacheFile) -> Result<()> {
        match &self.file {
            Some(file) => write_atomic(file, state),
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheFile> {
        // A panic mid-insert cannot leave a half-written map entry.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_atomic(file: &Path, snapshot: &CacheFile) -> Result<()> {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let json = serde_json::to_string_pretty(snapshot).map_err(|e| Error::Cache {
        reason: e.to_string(),
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(json.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(file).map_err(|e| Error::io(file, e.error))?;
    Ok(())
}
