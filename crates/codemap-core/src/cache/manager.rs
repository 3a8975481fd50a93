use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{
    aggregate_hash, hash_file, AnalysisCache, CacheState, FileCacheStore, InvalidationEngine, Probe,
    StateEntry,
};
use crate::config::{resolve_path, Options};
use crate::errors::{CodemapError, Result};
use crate::language::LanguageSet;
use crate::parallel::{CancellationToken, WorkerPool};
use crate::snapshot::Snapshot;

/// Which check produced the current aggregate hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Root entries, directory mtimes and per-file stats all matched
    Metadata,
    /// Tree shape matched; changed files were rehashed
    IndexFromCache,
    /// Full walk of the tree
    FullWalk,
}

#[derive(Debug, Clone)]
pub struct CurrentHash {
    pub hash: String,
    pub tier: Tier,
}

/// Main interface for staleness checks and cache recomputation
pub struct CacheManager<'s> {
    store: &'s FileCacheStore,
    pool: WorkerPool,
    root: PathBuf,
    state_path: PathBuf,
    analysis_path: PathBuf,
    languages: LanguageSet,
    ignored_root_entries: Vec<String>,
}

impl<'s> CacheManager<'s> {
    /// Create a manager for an already-resolved project root
    pub fn new(root: &Path, options: &Options, store: &'s FileCacheStore) -> Result<Self> {
        Ok(Self {
            store,
            pool: WorkerPool::new(),
            root: root.to_path_buf(),
            state_path: resolve_path(root, &options.state_path),
            analysis_path: resolve_path(root, &options.analysis_state_path()),
            languages: options.language_set()?,
            ignored_root_entries: options.ignored_root_entries(),
        })
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn languages(&self) -> &LanguageSet {
        &self.languages
    }

    pub fn pool(&self) -> WorkerPool {
        self.pool
    }

    pub fn store(&self) -> &'s FileCacheStore {
        self.store
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Load the persisted state; anything unusable is a miss
    pub fn load_state(&self) -> Result<Option<CacheState>> {
        Ok(self.store.read_state(&self.state_path)?)
    }

    pub fn load_analysis(&self) -> Result<Option<AnalysisCache>> {
        Ok(self.store.read_analysis(&self.analysis_path)?)
    }

    /// Persist the state and, separately, its analysis cache
    pub fn save(&self, state: &CacheState) -> Result<()> {
        self.store.write_state(&self.state_path, state)?;
        self.store
            .write_analysis(&self.analysis_path, state.analysis.as_ref())?;
        Ok(())
    }

    /// Whether any recorded output hash differs from the tree's current hash.
    ///
    /// An empty recorded hash means the output is missing or unreadable and
    /// is stale without looking at the tree.
    pub fn check_stale(
        &self,
        output_hashes: &[String],
        state: Option<&CacheState>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if output_hashes.iter().any(|h| h.is_empty()) {
            debug!("Output missing or has no hash header");
            return Ok(true);
        }
        let current = self.current_hash(state, cancel)?;
        Ok(output_hashes.iter().any(|h| *h != current.hash))
    }

    /// Current aggregate hash, using the cheapest tier the cache allows
    pub fn current_hash(
        &self,
        state: Option<&CacheState>,
        cancel: &CancellationToken,
    ) -> Result<CurrentHash> {
        let (snapshot, tier, fresh) = self.snapshot(state)?;
        if let Some(hash) = fresh {
            debug!("Aggregate hash confirmed from metadata");
            return Ok(CurrentHash { hash, tier });
        }
        let (hash, _) = self.recompute(&snapshot, state, cancel)?;
        debug!("Aggregate hash recomputed ({:?})", tier);
        Ok(CurrentHash { hash, tier })
    }

    /// Snapshot of the tree, rebuilt from the cached file list when its shape
    /// still matches. The hash is set only when the persisted aggregate hash
    /// is known to still hold.
    pub fn snapshot(&self, state: Option<&CacheState>) -> Result<(Snapshot, Tier, Option<String>)> {
        if let Some(state) = state {
            let engine =
                InvalidationEngine::new(&self.root, state, &self.languages, &self.ignored_root_entries);
            match engine.probe()? {
                Probe::Fresh {
                    aggregate_hash,
                    snapshot,
                } => return Ok((snapshot, Tier::Metadata, Some(aggregate_hash))),
                Probe::Changed(snapshot) => return Ok((snapshot, Tier::IndexFromCache, None)),
                Probe::Miss => debug!("Cached tree shape changed, walking {}", self.root.display()),
            }
        }
        let snapshot = Snapshot::build(&self.root, &self.languages)?;
        Ok((snapshot, Tier::FullWalk, None))
    }

    /// Hash the snapshot, reusing every cached hash whose size and mtime still
    /// match, and build the state that describes it.
    ///
    /// Any hashing error aborts; nothing is written here.
    pub fn recompute(
        &self,
        snapshot: &Snapshot,
        prior: Option<&CacheState>,
        cancel: &CancellationToken,
    ) -> Result<(String, CacheState)> {
        let mut entries = Vec::with_capacity(snapshot.files.len());
        let mut to_hash = Vec::new();

        // Both lists are sorted by path, so one forward cursor finds every match.
        let cached = prior
            .filter(|p| p.is_version_compatible())
            .map(|p| p.entries.as_slice())
            .unwrap_or(&[]);
        let mut cursor = 0;

        for file in &snapshot.files {
            while cursor < cached.len() && cached[cursor].rel_path < file.rel_path {
                cursor += 1;
            }
            let reused = cached
                .get(cursor)
                .filter(|c| c.rel_path == file.rel_path)
                .filter(|c| !c.content_hash.is_empty() && c.matches_metadata(file.size, file.mod_time))
                .map(|c| c.content_hash.clone());

            match reused {
                Some(hash) => entries.push(StateEntry::from_file(file, hash)),
                None => {
                    to_hash.push((entries.len(), file.abs_path.clone()));
                    entries.push(StateEntry::from_file(file, String::new()));
                }
            }
        }

        let reused = entries.len() - to_hash.len();
        if !to_hash.is_empty() {
            let hashed = self.pool.run(to_hash, cancel, |(index, path)| {
                hash_file(&path)
                    .map(|hash| (index, hash))
                    .map_err(|e| CodemapError::io(path, e))
            })?;
            for (index, hash) in hashed {
                entries[index].content_hash = hash;
            }
        }
        info!(
            "Hashed {} of {} files ({} reused)",
            entries.len() - reused,
            entries.len(),
            reused
        );

        let hash = aggregate_hash(
            entries
                .iter()
                .map(|e| (e.rel_path.as_str(), e.content_hash.as_str())),
        );
        let state = CacheState::from_snapshot(snapshot, hash.clone(), entries);
        Ok((hash, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("pkg")).unwrap();
        fs::write(temp_dir.path().join("main.go"), "package main\n").unwrap();
        fs::write(temp_dir.path().join("pkg/a.go"), "package pkg\n").unwrap();
        temp_dir
    }

    #[test]
    fn test_recompute_without_prior_hashes_everything() {
        let temp_dir = setup();
        let store = FileCacheStore::new();
        let manager = CacheManager::new(temp_dir.path(), &Options::default(), &store).unwrap();
        let snapshot = Snapshot::build(temp_dir.path(), manager.languages()).unwrap();

        let (hash, state) = manager
            .recompute(&snapshot, None, &CancellationToken::new())
            .unwrap();
        assert_eq!(state.aggregate_hash, hash);
        assert_eq!(state.entries.len(), 2);
        assert!(state.is_fully_hashed());
        assert_eq!(state.dirs.len(), 1);
    }

    #[test]
    fn test_current_hash_tiers() {
        let temp_dir = setup();
        let store = FileCacheStore::new();
        let manager = CacheManager::new(temp_dir.path(), &Options::default(), &store).unwrap();
        let cancel = CancellationToken::new();

        let full = manager.current_hash(None, &cancel).unwrap();
        assert_eq!(full.tier, Tier::FullWalk);

        let snapshot = Snapshot::build(temp_dir.path(), manager.languages()).unwrap();
        let (_, state) = manager.recompute(&snapshot, None, &cancel).unwrap();

        let fast = manager.current_hash(Some(&state), &cancel).unwrap();
        assert_eq!(fast.tier, Tier::Metadata);
        assert_eq!(fast.hash, full.hash);
    }

    #[test]
    fn test_check_stale_with_missing_output() {
        let temp_dir = setup();
        let store = FileCacheStore::new();
        let manager = CacheManager::new(temp_dir.path(), &Options::default(), &store).unwrap();
        let cancel = CancellationToken::new();
        assert!(manager
            .check_stale(&[String::new()], None, &cancel)
            .unwrap());

        let current = manager.current_hash(None, &cancel).unwrap();
        assert!(!manager.check_stale(&[current.hash.clone()], None, &cancel).unwrap());
        assert!(manager
            .check_stale(&[current.hash, "0000".to_string()], None, &cancel)
            .unwrap());
    }

    #[test]
    fn test_recompute_cancelled_before_hashing() {
        let temp_dir = setup();
        let store = FileCacheStore::new();
        let manager = CacheManager::new(temp_dir.path(), &Options::default(), &store).unwrap();
        let snapshot = Snapshot::build(temp_dir.path(), manager.languages()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(manager
            .recompute(&snapshot, None, &cancel)
            .unwrap_err()
            .is_cancelled());
    }

    #[test]
    fn test_save_then_load_state() {
        let temp_dir = setup();
        let store = FileCacheStore::new();
        let manager = CacheManager::new(temp_dir.path(), &Options::default(), &store).unwrap();
        let snapshot = Snapshot::build(temp_dir.path(), manager.languages()).unwrap();
        let (hash, state) = manager
            .recompute(&snapshot, None, &CancellationToken::new())
            .unwrap();
        manager.save(&state).unwrap();

        let reopened = FileCacheStore::new();
        let manager = CacheManager::new(temp_dir.path(), &Options::default(), &reopened).unwrap();
        let loaded = manager.load_state().unwrap().unwrap();
        assert_eq!(loaded.aggregate_hash, hash);
        assert!(manager.load_analysis().unwrap().is_none());
    }
}
