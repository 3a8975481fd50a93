//! Metadata-only checks that decide how much of the cached tree can be trusted.

use rayon::prelude::*;
use std::path::Path;

use super::{CacheState, DirStateEntry, StateEntry};
use crate::errors::Result;
use crate::language::LanguageSet;
use crate::snapshot::{
    abs_from_rel, mod_time_nanos, read_root_entries, DirEntry, FileEntry, SniffedFile, Snapshot,
};

const PARALLEL_DIR_THRESHOLD: usize = 128;
const PARALLEL_FILE_THRESHOLD: usize = 64;

/// Outcome of probing the filesystem against a cached state
#[derive(Debug)]
pub enum Probe {
    /// Every cached path matches and is hashed; the persisted aggregate hash stands.
    Fresh {
        aggregate_hash: String,
        snapshot: Snapshot,
    },

    /// Same tree shape, but some files changed size or mtime. The snapshot was
    /// rebuilt from per-path stats.
    Changed(Snapshot),

    /// The cached file list no longer describes the tree; walk it again.
    Miss,
}

pub struct InvalidationEngine<'a> {
    root: &'a Path,
    state: &'a CacheState,
    languages: &'a LanguageSet,
    ignored_root_entries: &'a [String],
}

impl<'a> InvalidationEngine<'a> {
    pub fn new(
        root: &'a Path,
        state: &'a CacheState,
        languages: &'a LanguageSet,
        ignored_root_entries: &'a [String],
    ) -> Self {
        Self {
            root,
            state,
            languages,
            ignored_root_entries,
        }
    }

    pub fn probe(&self) -> Result<Probe> {
        if !self.state.is_version_compatible() {
            return Ok(Probe::Miss);
        }
        // A different language set classifies the same tree differently.
        if self.state.languages.as_slice() != self.languages.languages() {
            return Ok(Probe::Miss);
        }
        if !self.root_entries_match()? {
            return Ok(Probe::Miss);
        }
        if !directories_match(self.root, &self.state.dirs) {
            return Ok(Probe::Miss);
        }
        if !sniffed_match(self.root, &self.state.sniffed) {
            return Ok(Probe::Miss);
        }
        let Ok(root_meta) = std::fs::metadata(self.root) else {
            return Ok(Probe::Miss);
        };
        let Some((files, unchanged)) = stat_entries(self.root, &self.state.entries, self.languages) else {
            return Ok(Probe::Miss);
        };

        let mut dirs = Vec::with_capacity(self.state.dirs.len() + 1);
        dirs.push(DirEntry {
            rel_path: ".".to_string(),
            mod_time: mod_time_nanos(&root_meta),
        });
        dirs.extend(self.state.dirs.iter().map(|d| DirEntry {
            rel_path: d.rel_path.clone(),
            mod_time: d.mod_time,
        }));

        let snapshot = Snapshot {
            root: self.root.to_path_buf(),
            languages: self.languages.languages().to_vec(),
            root_entries: self.state.root_entries.clone(),
            dirs,
            files,
            sniffed: self.state.sniffed.clone(),
        };

        if unchanged && !self.state.aggregate_hash.is_empty() {
            Ok(Probe::Fresh {
                aggregate_hash: self.state.aggregate_hash.clone(),
                snapshot,
            })
        } else {
            Ok(Probe::Changed(snapshot))
        }
    }

    /// Compare the root's direct children with the cached names, ignoring
    /// files this tool writes itself.
    pub fn root_entries_match(&self) -> Result<bool> {
        let ignored = |name: &String| self.ignored_root_entries.contains(name);
        let current: Vec<String> = read_root_entries(self.root)?
            .into_iter()
            .filter(|n| !ignored(n))
            .collect();
        let expected: Vec<&String> = self.state.root_entries.iter().filter(|n| !ignored(n)).collect();

        Ok(current.len() == expected.len() && current.iter().zip(expected).all(|(a, b)| a == b))
    }
}

/// Every cached directory still exists with the same mtime
pub fn directories_match(root: &Path, dirs: &[DirStateEntry]) -> bool {
    let check = |dir: &DirStateEntry| {
        std::fs::symlink_metadata(abs_from_rel(root, &dir.rel_path))
            .map(|meta| meta.is_dir() && mod_time_nanos(&meta) == dir.mod_time)
            .unwrap_or(false)
    };
    if dirs.len() >= PARALLEL_DIR_THRESHOLD {
        dirs.par_iter().all(check)
    } else {
        dirs.iter().all(check)
    }
}

/// Every rejected sniff candidate is still a regular file with the same size
/// and mtime, so its first line cannot have changed.
pub fn sniffed_match(root: &Path, sniffed: &[SniffedFile]) -> bool {
    let check = |file: &SniffedFile| {
        std::fs::symlink_metadata(abs_from_rel(root, &file.rel_path))
            .map(|meta| {
                meta.is_file() && meta.len() == file.size && mod_time_nanos(&meta) == file.mod_time
            })
            .unwrap_or(false)
    };
    if sniffed.len() >= PARALLEL_FILE_THRESHOLD {
        sniffed.par_iter().all(check)
    } else {
        sniffed.iter().all(check)
    }
}

/// Stat every cached file.
///
/// `None` when any path vanished, turned into a directory, lost its
/// language, or is a shebang-classified script whose metadata moved. Otherwise the fresh entries and whether all of them still match
/// their cached size, mtime and hash.
pub fn stat_entries(
    root: &Path,
    entries: &[StateEntry],
    languages: &LanguageSet,
) -> Option<(Vec<FileEntry>, bool)> {
    let stat = |entry: &StateEntry| -> Option<(FileEntry, bool)> {
        let language = entry.language.filter(|l| languages.contains(*l))?;
        let abs_path = abs_from_rel(root, &entry.rel_path);
        let meta = std::fs::symlink_metadata(&abs_path).ok()?;
        if meta.is_dir() {
            return None;
        }
        let size = meta.len();
        let mod_time = mod_time_nanos(&meta);
        let same_metadata = entry.matches_metadata(size, mod_time);
        if !same_metadata && languages.sniffs(&entry.rel_path) {
            return None;
        }
        let unchanged = !entry.content_hash.is_empty() && same_metadata;
        Some((
            FileEntry {
                abs_path,
                rel_path: entry.rel_path.clone(),
                size,
                mod_time,
                language,
                is_test: entry.is_test,
            },
            unchanged,
        ))
    };

    let stats: Vec<(FileEntry, bool)> = if entries.len() >= PARALLEL_FILE_THRESHOLD {
        entries.par_iter().map(stat).collect::<Option<Vec<_>>>()?
    } else {
        entries.iter().map(stat).collect::<Option<Vec<_>>>()?
    };

    let unchanged = stats.iter().all(|(_, same)| *same);
    Some((stats.into_iter().map(|(file, _)| file).collect(), unchanged))
}
