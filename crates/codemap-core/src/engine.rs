//! Top-level operations: staleness check, regeneration and bare hashing.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::{write_atomic, CacheManager, FileCacheStore};
use crate::config::{resolve_path, Options};
use crate::errors::{CodemapError, Result};
use crate::model::Codemap;
use crate::parallel::CancellationToken;
use crate::registry::ExtractorRegistry;
use crate::render::{render_markdown, render_paths};
use crate::snapshot::Snapshot;

/// Canonical project root; fails before any other work when it cannot be resolved.
pub fn resolve_root(options: &Options) -> Result<PathBuf> {
    let root = std::fs::canonicalize(&options.project_root).map_err(|source| {
        CodemapError::InvalidRoot {
            path: options.project_root.clone(),
            source,
        }
    })?;
    if !root.is_dir() {
        return Err(CodemapError::InvalidRoot {
            path: options.project_root.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    Ok(root)
}

/// Markdown output path and, unless disabled, the paths output path
pub fn output_paths(root: &Path, options: &Options) -> (PathBuf, Option<PathBuf>) {
    let markdown = resolve_path(root, &options.output_path);
    let paths = (!options.disable_paths).then(|| resolve_path(root, &options.paths_output_path));
    (markdown, paths)
}

/// Whether the rendered outputs no longer describe the tree
pub fn is_stale(options: &Options, store: &FileCacheStore, cancel: &CancellationToken) -> Result<bool> {
    let root = resolve_root(options)?;
    let manager = CacheManager::new(&root, options, store)?;

    let (markdown, paths) = output_paths(&root, options);
    let mut recorded = vec![store.read_output_hash(&markdown)?];
    if let Some(paths) = &paths {
        recorded.push(store.read_output_hash(paths)?);
    }

    let state = manager.load_state()?;
    let stale = manager.check_stale(&recorded, state.as_ref(), cancel)?;
    debug!("{} is {}", root.display(), if stale { "stale" } else { "up to date" });
    Ok(stale)
}

/// Rehash, reanalyze changed units, write both outputs and persist the caches.
///
/// Nothing is written once `cancel` has fired. A cache write debounced by
/// `store` reaches the disk on [`FileCacheStore::flush`] or when the store
/// is dropped.
pub fn generate(options: &Options, store: &FileCacheStore, cancel: &CancellationToken) -> Result<Codemap> {
    let root = resolve_root(options)?;
    let registry = ExtractorRegistry::for_languages(&options.language_set()?);
    if registry.is_empty() {
        return Err(CodemapError::NoExtractors);
    }
    let manager = CacheManager::new(&root, options, store)?;

    let prior = manager.load_state()?;
    let (snapshot, tier, _) = manager.snapshot(prior.as_ref())?;
    debug!("Snapshot from {:?}: {} files", tier, snapshot.files.len());
    let (hash, mut state) = manager.recompute(&snapshot, prior.as_ref(), cancel)?;

    let prior_analysis = manager.load_analysis()?;
    let outcome = registry.analyze(
        &snapshot,
        &state,
        prior_analysis.as_ref(),
        options,
        manager.pool(),
        cancel,
    )?;

    let mut codemap = Codemap::new(root.clone());
    codemap.content_hash = hash;
    codemap.packages = outcome.packages;
    codemap.concerns = outcome.concerns;

    cancel.check()?;
    let (markdown, paths) = output_paths(&root, options);
    write_output(store, &markdown, &render_markdown(&codemap), &codemap.content_hash)?;
    if let Some(paths) = &paths {
        write_output(store, paths, &render_paths(&codemap), &codemap.content_hash)?;
    }

    state.analysis = Some(outcome.analysis);
    manager.save(&state)?;

    info!(
        "Indexed {} packages from {} files ({} units reused)",
        codemap.packages.len(),
        state.entries.len(),
        outcome.stats.reused
    );
    Ok(codemap)
}

/// Regenerate only when stale. `None` means the outputs were already current.
pub fn ensure_up_to_date(
    options: &Options,
    store: &FileCacheStore,
    cancel: &CancellationToken,
) -> Result<Option<Codemap>> {
    if !is_stale(options, store, cancel)? {
        return Ok(None);
    }
    generate(options, store, cancel).map(Some)
}

/// Aggregate hash of the tree under `root`, ignoring every persisted cache
pub fn compute_hash(root: &Path, cancel: &CancellationToken) -> Result<String> {
    let options = Options {
        project_root: root.to_path_buf(),
        ..Options::default()
    };
    let root = resolve_root(&options)?;
    let store = FileCacheStore::new();
    let manager = CacheManager::new(&root, &options, &store)?;
    let snapshot = Snapshot::build(&root, manager.languages())?;
    let (hash, _) = manager.recompute(&snapshot, None, cancel)?;
    Ok(hash)
}

fn write_output(store: &FileCacheStore, path: &Path, content: &str, hash: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())?;
    store.record_output_hash(path, hash);
    debug!("Wrote {}", path.display());
    Ok(())
}
