use rustc_hash::{FxHashMap, FxHashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{AnalysisCache, CacheError, CacheState, Result};
use crate::render::read_existing_hash;

/// Minimum time between two disk writes of the same cache file
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Per-invocation read cache for the persisted cache files and output hashes.
///
/// The files on disk stay the source of truth; this only avoids parsing the
/// same path twice and debounces rapid rewrites.
pub struct FileCacheStore {
    flush_interval: Duration,
    states: Mutex<FxHashMap<PathBuf, CacheState>>,
    analyses: Mutex<FxHashMap<PathBuf, Option<AnalysisCache>>>,
    output_hashes: Mutex<FxHashMap<PathBuf, String>>,
    last_flush: Mutex<FxHashMap<PathBuf, Instant>>,
    /// Paths whose latest in-memory write has not reached the disk
    pending: Mutex<FxHashSet<PathBuf>>,
}

impl Default for FileCacheStore {
    fn default() -> Self {
        Self::with_flush_interval(DEFAULT_FLUSH_INTERVAL)
    }
}

impl FileCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flush_interval(flush_interval: Duration) -> Self {
        Self {
            flush_interval,
            states: Mutex::new(FxHashMap::default()),
            analyses: Mutex::new(FxHashMap::default()),
            output_hashes: Mutex::new(FxHashMap::default()),
            last_flush: Mutex::new(FxHashMap::default()),
            pending: Mutex::new(FxHashSet::default()),
        }
    }

    /// Load the hot-path state. Missing, corrupt or version-mismatched files
    /// all read as `None`.
    pub fn read_state(&self, path: &Path) -> Result<Option<CacheState>> {
        if let Some(state) = lock(&self.states).get(path) {
            return Ok(Some(state.clone()));
        }

        let Some(bytes) = read_optional(path)? else {
            return Ok(None);
        };
        match CacheState::from_bytes(&bytes) {
            Ok(state) => {
                debug!(
                    "Loaded cache state with {} entries from {}",
                    state.entries.len(),
                    path.display()
                );
                lock(&self.states).insert(path.to_path_buf(), state.clone());
                Ok(Some(state))
            }
            Err(e) => {
                warn!("Ignoring unusable cache state {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Persist the hot-path state without its analysis part.
    ///
    /// Returns whether the disk was written; a write within the flush
    /// interval of the previous one only updates memory.
    pub fn write_state(&self, path: &Path, state: &CacheState) -> Result<bool> {
        let mut stored = state.clone();
        stored.analysis = None;
        let bytes = stored.to_bytes()?;
        lock(&self.states).insert(path.to_path_buf(), stored);
        self.flush_debounced(path, &bytes)
    }

    pub fn read_analysis(&self, path: &Path) -> Result<Option<AnalysisCache>> {
        if let Some(cache) = lock(&self.analyses).get(path) {
            return Ok(cache.clone());
        }

        let cache = match read_optional(path)? {
            None => None,
            Some(bytes) => match AnalysisCache::from_bytes(&bytes) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Ignoring unusable analysis cache {}: {}", path.display(), e);
                    None
                }
            },
        };
        lock(&self.analyses).insert(path.to_path_buf(), cache.clone());
        Ok(cache)
    }

    /// Persist the analysis cache; an absent or empty cache removes the file.
    pub fn write_analysis(&self, path: &Path, cache: Option<&AnalysisCache>) -> Result<bool> {
        let cache = cache.filter(|c| !c.is_empty());
        lock(&self.analyses).insert(path.to_path_buf(), cache.cloned());

        match cache {
            Some(cache) => {
                let bytes = cache.to_bytes()?;
                self.flush_debounced(path, &bytes)
            }
            None => {
                lock(&self.pending).remove(path);
                match std::fs::remove_file(path) {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(CacheError::io(path, e)),
                }
            }
        }
    }

    /// Hash recorded in a previously rendered output; empty when absent.
    pub fn read_output_hash(&self, path: &Path) -> Result<String> {
        if let Some(hash) = lock(&self.output_hashes).get(path) {
            return Ok(hash.clone());
        }
        let hash = read_existing_hash(path).map_err(|e| CacheError::io(path, e))?;
        lock(&self.output_hashes).insert(path.to_path_buf(), hash.clone());
        Ok(hash)
    }

    /// Remember the hash of an output this process just wrote
    pub fn record_output_hash(&self, path: &Path, hash: &str) {
        lock(&self.output_hashes).insert(path.to_path_buf(), hash.to_string());
    }

    /// Write out every cache file whose last update was debounced
    pub fn flush(&self) -> Result<()> {
        let pending: Vec<PathBuf> = lock(&self.pending).drain().collect();
        for path in pending {
            let bytes = if let Some(state) = lock(&self.states).get(&path) {
                Some(state.to_bytes()?)
            } else if let Some(Some(cache)) = lock(&self.analyses).get(&path) {
                Some(cache.to_bytes()?)
            } else {
                None
            };
            if let Some(bytes) = bytes {
                write_atomic(&path, &bytes)?;
                lock(&self.last_flush).insert(path, Instant::now());
            }
        }
        Ok(())
    }

    fn flush_debounced(&self, path: &Path, bytes: &[u8]) -> Result<bool> {
        let now = Instant::now();
        let recent = lock(&self.last_flush)
            .get(path)
            .is_some_and(|last| now.duration_since(*last) < self.flush_interval);
        if recent {
            debug!("Debounced cache write to {}", path.display());
            lock(&self.pending).insert(path.to_path_buf());
            return Ok(false);
        }

        write_atomic(path, bytes)?;
        lock(&self.pending).remove(path);
        lock(&self.last_flush).insert(path.to_path_buf(), now);
        info!("Saved cache file {} ({} bytes)", path.display(), bytes.len());
        Ok(true)
    }
}

impl Drop for FileCacheStore {
    /// Debounced writes still reach the disk when a caller never flushes.
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush pending cache writes: {}", e);
        }
    }
}

/// Write to `<path>.tmp` then rename over `path`.
///
/// A crash mid-write leaves the previous file intact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, bytes).map_err(|e| CacheError::io(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(CacheError::io(path, e));
    }
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
