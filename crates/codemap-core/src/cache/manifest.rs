use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{AnalysisCache, CacheError, Result, STATE_VERSION};
use crate::language::Language;
use crate::snapshot::{DirEntry, FileEntry, SniffedFile, Snapshot};

/// Cached identity and content hash of one tracked file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub rel_path: String,
    pub size: u64,
    pub mod_time: i64,
    /// Blake3 of the file bytes; empty when not yet hashed
    pub content_hash: String,
    pub language: Option<Language>,
    pub is_test: bool,
}

impl StateEntry {
    /// Whether size and modification time still match a fresh file entry
    pub fn matches_metadata(&self, size: u64, mod_time: i64) -> bool {
        self.size == size && self.mod_time == mod_time
    }

    pub fn from_file(file: &FileEntry, content_hash: String) -> Self {
        Self {
            rel_path: file.rel_path.clone(),
            size: file.size,
            mod_time: file.mod_time,
            content_hash,
            language: Some(file.language),
            is_test: file.is_test,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirStateEntry {
    pub rel_path: String,
    pub mod_time: i64,
}

impl From<&DirEntry> for DirStateEntry {
    fn from(dir: &DirEntry) -> Self {
        Self {
            rel_path: dir.rel_path.clone(),
            mod_time: dir.mod_time,
        }
    }
}

/// Hot-path cache: per-file metadata, content hashes and the aggregate hash.
///
/// `dirs` and `entries` are kept sorted by path. The analysis cache rides
/// along in memory but is persisted to its own file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheState {
    /// Schema version for the cache format
    pub version: u32,

    pub aggregate_hash: String,

    /// Languages enabled when the tree was classified
    pub languages: Vec<Language>,

    /// Sorted names of the root's direct children
    pub root_entries: Vec<String>,

    /// Every walked directory except the root itself
    pub dirs: Vec<DirStateEntry>,

    pub entries: Vec<StateEntry>,

    /// Extension-less files that did not sniff as scripts
    pub sniffed: Vec<SniffedFile>,

    #[serde(skip)]
    pub analysis: Option<AnalysisCache>,
}

impl CacheState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            ..Self::default()
        }
    }

    /// State describing `snapshot` with the given per-file entries
    pub fn from_snapshot(snapshot: &Snapshot, aggregate_hash: String, entries: Vec<StateEntry>) -> Self {
        let mut state = Self {
            version: STATE_VERSION,
            aggregate_hash,
            languages: snapshot.languages.clone(),
            root_entries: snapshot.root_entries.clone(),
            dirs: snapshot
                .dirs
                .iter()
                .filter(|d| d.rel_path != ".")
                .map(DirStateEntry::from)
                .collect(),
            entries,
            sniffed: snapshot.sniffed.clone(),
            analysis: None,
        };
        state.normalize();
        state
    }

    pub fn is_version_compatible(&self) -> bool {
        self.version == STATE_VERSION
    }

    /// Sort every list so lookups can binary search
    pub fn normalize(&mut self) {
        self.root_entries.sort();
        self.dirs.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        self.entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        self.sniffed.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        self.languages.sort();
        self.languages.dedup();
    }

    pub fn entry(&self, rel_path: &str) -> Option<&StateEntry> {
        self.entries
            .binary_search_by(|e| e.rel_path.as_str().cmp(rel_path))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn entries_by_path(&self) -> FxHashMap<&str, &StateEntry> {
        self.entries
            .iter()
            .map(|e| (e.rel_path.as_str(), e))
            .collect()
    }

    /// True when every entry carries a content hash
    pub fn is_fully_hashed(&self) -> bool {
        self.entries.iter().all(|e| !e.content_hash.is_empty())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(CacheError::from)
    }

    /// Decode and reject other schema versions
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut state: CacheState = bincode::deserialize(bytes)?;
        if !state.is_version_compatible() {
            return Err(CacheError::VersionMismatch {
                expected: STATE_VERSION,
                found: state.version,
            });
        }
        state.normalize();
        Ok(state)
    }
}
