use codemap_core::cache::{CacheManager, FileCacheStore};
use codemap_core::{generate, CancellationToken, ExtractorRegistry, Options, Snapshot, WorkerPool};
use std::fs::{self, File};
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn options_for(root: &Path) -> Options {
    Options {
        project_root: root.to_path_buf(),
        ..Options::default()
    }
}

fn three_units() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "go.mod", "module example.com/three\n");
    write(root, "alpha/alpha.go", "// Package alpha is first.\npackage alpha\n");
    write(root, "beta/beta.go", "// Package beta is second.\npackage beta\n");
    write(root, "gamma/gamma.go", "// Package gamma is third.\npackage gamma\n");
    temp_dir
}

#[test]
fn test_unchanged_unit_reuses_cached_analysis() {
    let temp_dir = three_units();
    let root = temp_dir.path();
    let options = options_for(root);
    let cancel = CancellationToken::new();

    let first = generate(&options, &FileCacheStore::new(), &cancel).unwrap();
    assert_eq!(first.packages[0].purpose, "Package alpha is first.");

    // Same length and mtime: the cached content hash, and so the cached
    // analysis, stays authoritative.
    let path = root.join("alpha/alpha.go");
    let mtime = fs::metadata(&path).unwrap().modified().unwrap();
    fs::write(&path, "// Package alpha is FIRST.\npackage alpha\n").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();

    let second = generate(&options, &FileCacheStore::new(), &cancel).unwrap();
    assert_eq!(second.content_hash, first.content_hash);
    assert_eq!(second.packages[0].purpose, "Package alpha is first.");
}

#[test]
fn test_only_changed_units_are_reanalyzed() {
    let temp_dir = three_units();
    let root = fs::canonicalize(temp_dir.path()).unwrap();
    let options = options_for(&root);
    let cancel = CancellationToken::new();
    let registry = ExtractorRegistry::default();
    let store = FileCacheStore::new();
    let manager = CacheManager::new(&root, &options, &store).unwrap();

    let snapshot = Snapshot::build(&root, manager.languages()).unwrap();
    let (_, state) = manager.recompute(&snapshot, None, &cancel).unwrap();
    let first = registry
        .analyze(&snapshot, &state, None, &options, WorkerPool::new(), &cancel)
        .unwrap();
    assert_eq!(first.stats.analyzed, 3);

    write(&root, "beta/beta.go", "// Package beta changed a lot.\npackage beta\n");
    let snapshot = Snapshot::build(&root, manager.languages()).unwrap();
    let (_, state) = manager.recompute(&snapshot, Some(&state), &cancel).unwrap();
    let second = registry
        .analyze(&snapshot, &state, Some(&first.analysis), &options, WorkerPool::new(), &cancel)
        .unwrap();

    assert_eq!(second.stats.reused, 2);
    assert_eq!(second.stats.analyzed, 1);
    assert_eq!(second.packages[1].purpose, "Package beta changed a lot.");
}

#[test]
fn test_vanished_unit_is_skipped() {
    let temp_dir = three_units();
    let root = fs::canonicalize(temp_dir.path()).unwrap();
    let options = options_for(&root);
    let cancel = CancellationToken::new();
    let store = FileCacheStore::new();
    let manager = CacheManager::new(&root, &options, &store).unwrap();

    let snapshot = Snapshot::build(&root, manager.languages()).unwrap();
    let (_, state) = manager.recompute(&snapshot, None, &cancel).unwrap();

    fs::remove_dir_all(root.join("beta")).unwrap();

    let outcome = ExtractorRegistry::default()
        .analyze(&snapshot, &state, None, &options, WorkerPool::with_workers(2), &cancel)
        .unwrap();
    let units: Vec<&str> = outcome
        .packages
        .iter()
        .map(|p| p.relative_path.as_str())
        .collect();
    assert_eq!(units, vec!["alpha", "gamma"]);
    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.analysis.package_count(), 2);
}

#[test]
fn test_tree_without_sources_generates_empty_index() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "README.md", "# nothing to index\n");
    let options = options_for(temp_dir.path());

    let codemap = generate(&options, &FileCacheStore::new(), &CancellationToken::new()).unwrap();
    assert!(codemap.packages.is_empty());
    assert!(temp_dir.path().join("CODEMAP.md").exists());
    assert!(!temp_dir.path().join(".codemap.state.analysis.bin").exists());
}

#[test]
fn test_mixed_languages_are_merged_in_path_order() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "cmd/tool/main.go", "package main\n\nfunc main() {}\n");
    write(
        root,
        "crates/core/Cargo.toml",
        "[package]\nname = \"tool-core\"\nversion = \"0.1.0\"\n",
    );
    write(root, "crates/core/src/lib.rs", "//! Core logic.\npub struct Engine;\n");
    write(root, "web/package.json", "{\"name\": \"tool-web\"}\n");
    write(root, "web/src/index.ts", "export function start() {}\n");
    write(root, "scripts/bootstrap.sh", "#!/bin/sh\n# Bootstrap a dev box.\nsetup() {\n  :\n}\n");

    let codemap = generate(&options_for(root), &FileCacheStore::new(), &CancellationToken::new()).unwrap();
    let summary: Vec<(&str, &str, String)> = codemap
        .packages
        .iter()
        .map(|p| (p.relative_path.as_str(), p.import_path.as_str(), p.entry_path()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (".", root.file_name().unwrap().to_str().unwrap(), "scripts/bootstrap.sh".to_string()),
            ("cmd/tool", "cmd/tool", "cmd/tool/main.go".to_string()),
            ("crates/core", "tool-core", "crates/core/src/lib.rs".to_string()),
            ("web", "tool-web", "web/src/index.ts".to_string()),
        ]
    );
    let concern_names: Vec<&str> = codemap.concerns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(concern_names, vec!["CLI"]);
}
