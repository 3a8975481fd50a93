//! Deterministic snapshots of a source tree.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{CodemapError, Result};
use crate::language::{Language, LanguageSet};

/// Directory names pruned from every walk, besides dot-directories.
pub const EXCLUDED_DIRS: &[&str] = &["vendor", "testdata", "workspace", "node_modules"];

/// A tracked source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    /// Forward-slash path relative to the root; the identity of the entry.
    pub rel_path: String,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mod_time: i64,
    pub language: Language,
    pub is_test: bool,
}

/// A directory visited by the walk. Its mtime stands in for its entry set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub rel_path: String,
    pub mod_time: i64,
}

/// An extension-less regular file whose first line was read and rejected.
///
/// Rewriting it in place can turn it into a script without touching any
/// directory mtime, so its metadata is tracked like a source file's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SniffedFile {
    pub rel_path: String,
    pub size: u64,
    pub mod_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub root: PathBuf,
    /// Languages the files were classified against.
    pub languages: Vec<Language>,
    /// Sorted names of every direct child of the root, pruned ones included.
    pub root_entries: Vec<String>,
    /// Sorted by relative path; the root itself is `.`.
    pub dirs: Vec<DirEntry>,
    /// Sorted by relative path.
    pub files: Vec<FileEntry>,
    /// Sorted by relative path.
    pub sniffed: Vec<SniffedFile>,
}

impl Snapshot {
    /// Walk `root` once and classify every file.
    ///
    /// Any walk or read error aborts; no partial snapshot is returned.
    pub fn build(root: &Path, languages: &LanguageSet) -> Result<Self> {
        let root_entries = read_root_entries(root)?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut sniffed = Vec::new();

        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_pruned(e));

        for entry in walker {
            let entry = entry?;
            let rel_path = relative_slash_path(root, entry.path());
            let metadata = entry.metadata()?;

            if entry.file_type().is_dir() {
                dirs.push(DirEntry {
                    rel_path,
                    mod_time: mod_time_nanos(&metadata),
                });
                continue;
            }

            // Symlinks and special files are never opened.
            let regular = entry.file_type().is_file();
            let found = if regular {
                languages
                    .detect(entry.path(), &rel_path)
                    .map_err(|e| CodemapError::io(entry.path(), e))?
            } else {
                languages.match_path(&rel_path)
            };

            match found {
                Some(found) => files.push(FileEntry {
                    abs_path: entry.path().to_path_buf(),
                    rel_path,
                    size: metadata.len(),
                    mod_time: mod_time_nanos(&metadata),
                    language: found.language,
                    is_test: found.is_test,
                }),
                None if regular && languages.sniffs(&rel_path) => sniffed.push(SniffedFile {
                    rel_path,
                    size: metadata.len(),
                    mod_time: mod_time_nanos(&metadata),
                }),
                None => {}
            }
        }

        dirs.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        sniffed.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        debug!(
            "Snapshot of {}: {} files, {} directories",
            root.display(),
            files.len(),
            dirs.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            languages: languages.languages().to_vec(),
            root_entries,
            dirs,
            files,
            sniffed,
        })
    }

    /// Languages that have at least one tracked file, in id order.
    pub fn languages_present(&self) -> Vec<Language> {
        let mut present: Vec<Language> = self.files.iter().map(|f| f.language).collect();
        present.sort();
        present.dedup();
        present
    }
}

pub fn is_excluded_dir(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED_DIRS.contains(&name)
}

fn is_pruned(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && is_excluded_dir(&entry.file_name().to_string_lossy())
}

/// Sorted names of the root's direct children.
pub fn read_root_entries(root: &Path) -> Result<Vec<String>> {
    let read = std::fs::read_dir(root).map_err(|e| CodemapError::io(root, e))?;
    let mut names = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| CodemapError::io(root, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Join a forward-slash relative path onto the root.
pub fn abs_from_rel(root: &Path, rel_path: &str) -> PathBuf {
    if rel_path == "." {
        return root.to_path_buf();
    }
    rel_path
        .split('/')
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

pub fn mod_time_nanos(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
