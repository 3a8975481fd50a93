//! Groups snapshot files into analysis units and fingerprints each unit.
//!
//! Every language resolves a file's unit through an ordered list of
//! [`GroupingRule`]s; the first rule that yields a directory wins.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::{package_fingerprint, StateEntry};
use crate::language::Language;
use crate::snapshot::{abs_from_rel, Snapshot};

/// One analysis unit: a directory plus the files assigned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    /// Unit directory relative to the root, `.` for the root itself
    pub rel_path: String,
    pub abs_path: PathBuf,
    /// Sorted relative paths of member files
    pub files: Vec<String>,
    /// Empty when any member lacks a content hash
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingRule {
    /// The file's own directory
    Directory,

    /// Nearest ancestor directory, up to the root, containing any of these files
    NearestManifest(&'static [&'static str]),

    /// The directory above the first path segment listed in `segments`.
    /// Applies only when a directory segment is also listed in `triggers`;
    /// an empty `triggers` list always applies.
    Segments {
        segments: &'static [&'static str],
        triggers: &'static [&'static str],
    },

    /// The project root
    Root,
}

const PYTHON_MANIFESTS: &[&str] = &["pyproject.toml", "setup.cfg", "setup.py"];
const PYTHON_SEGMENTS: &[&str] = &["src", "tests", "test"];
const SHELL_SEGMENTS: &[&str] = &["scripts", "script", "bin", "hack", "tools", "tests", "test"];
const SHELL_TRIGGERS: &[&str] = &["scripts", "bin"];

static GO_RULES: [GroupingRule; 1] = [GroupingRule::Directory];
static RUST_RULES: [GroupingRule; 2] = [
    GroupingRule::NearestManifest(&["Cargo.toml"]),
    GroupingRule::Root,
];
static TYPESCRIPT_RULES: [GroupingRule; 2] = [
    GroupingRule::NearestManifest(&["package.json"]),
    GroupingRule::Root,
];
static PYTHON_RULES: [GroupingRule; 3] = [
    GroupingRule::NearestManifest(PYTHON_MANIFESTS),
    GroupingRule::Segments {
        segments: PYTHON_SEGMENTS,
        triggers: &[],
    },
    GroupingRule::Root,
];
static SHELL_RULES: [GroupingRule; 2] = [
    GroupingRule::Segments {
        segments: SHELL_SEGMENTS,
        triggers: SHELL_TRIGGERS,
    },
    GroupingRule::Directory,
];

/// Unit resolution rules for a language, in precedence order
pub fn grouping_rules(language: Language) -> &'static [GroupingRule] {
    match language {
        Language::Go => &GO_RULES,
        Language::Python => &PYTHON_RULES,
        Language::Rust => &RUST_RULES,
        Language::Shell => &SHELL_RULES,
        Language::TypeScript => &TYPESCRIPT_RULES,
    }
}

/// Directory names whose contents count as tests for a language
fn test_dirs(language: Language) -> &'static [&'static str] {
    match language {
        Language::Go => &[],
        Language::Rust => &["tests"],
        Language::Python | Language::Shell => &["tests", "test"],
        Language::TypeScript => &["__tests__"],
    }
}

/// Whether a file is excluded from planning when tests are not included
pub fn is_test_path(language: Language, rel_path: &str, flagged: bool) -> bool {
    if flagged {
        return true;
    }
    let lower = rel_path.to_ascii_lowercase();
    if dir_segments(&lower).any(|seg| test_dirs(language).contains(&seg)) {
        return true;
    }
    language == Language::Rust && (lower.ends_with(".test.rs") || lower.ends_with(".spec.rs"))
}

/// Resolves files to unit directories, memoizing manifest lookups per directory
pub struct UnitResolver<'a> {
    root: &'a Path,
    rules: &'static [GroupingRule],
    manifest_dirs: FxHashMap<String, Option<String>>,
}

impl<'a> UnitResolver<'a> {
    pub fn new(root: &'a Path, language: Language) -> Self {
        Self::with_rules(root, grouping_rules(language))
    }

    pub fn with_rules(root: &'a Path, rules: &'static [GroupingRule]) -> Self {
        Self {
            root,
            rules,
            manifest_dirs: FxHashMap::default(),
        }
    }

    /// Unit directory for a file, `.` when no rule applies
    pub fn resolve(&mut self, rel_path: &str) -> String {
        let rules = self.rules;
        for rule in rules {
            let found = match *rule {
                GroupingRule::Directory => Some(parent_rel(rel_path)),
                GroupingRule::NearestManifest(manifests) => {
                    self.nearest_manifest(&parent_rel(rel_path), manifests)
                }
                GroupingRule::Segments { segments, triggers } => {
                    segment_root(rel_path, segments, triggers)
                }
                GroupingRule::Root => Some(".".to_string()),
            };
            if let Some(dir) = found {
                return dir;
            }
        }
        ".".to_string()
    }

    fn nearest_manifest(&mut self, start: &str, manifests: &[&str]) -> Option<String> {
        let mut visited = Vec::new();
        let mut dir = start.to_string();
        let found = loop {
            if let Some(cached) = self.manifest_dirs.get(&dir) {
                break cached.clone();
            }
            visited.push(dir.clone());

            let abs = abs_from_rel(self.root, &dir);
            if manifests.iter().any(|name| abs.join(name).is_file()) {
                break Some(dir);
            }
            if dir == "." {
                break None;
            }
            dir = parent_rel(&dir);
        };

        for dir in visited {
            self.manifest_dirs.insert(dir, found.clone());
        }
        found
    }
}

/// Group the snapshot's files of one language into sorted unit plans
pub fn build_plans(
    snapshot: &Snapshot,
    language: Language,
    include_tests: bool,
    entries_by_path: &FxHashMap<&str, &StateEntry>,
) -> Vec<PackagePlan> {
    let mut resolver = UnitResolver::new(&snapshot.root, language);
    let mut units: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for file in snapshot.files.iter().filter(|f| f.language == language) {
        if !include_tests && is_test_path(language, &file.rel_path, file.is_test) {
            continue;
        }
        let unit = resolver.resolve(&file.rel_path);
        units.entry(unit).or_default().push(file.rel_path.clone());
    }

    units
        .into_iter()
        .map(|(rel_path, mut files)| {
            files.sort();
            let fingerprint = package_fingerprint(&files, entries_by_path);
            PackagePlan {
                abs_path: abs_from_rel(&snapshot.root, &rel_path),
                rel_path,
                files,
                fingerprint,
            }
        })
        .collect()
}

fn parent_rel(rel_path: &str) -> String {
    match rel_path.rfind('/') {
        Some(idx) => rel_path[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Directory segments of a relative path, without the file name
fn dir_segments(rel_path: &str) -> impl Iterator<Item = &str> {
    let dir = rel_path.rfind('/').map(|idx| &rel_path[..idx]).unwrap_or("");
    dir.split('/').filter(|s| !s.is_empty())
}

fn segment_root(rel_path: &str, segments: &[&str], triggers: &[&str]) -> Option<String> {
    let dirs: Vec<&str> = dir_segments(rel_path).collect();
    if !triggers.is_empty() && !dirs.iter().any(|d| triggers.contains(d)) {
        return None;
    }
    let idx = dirs.iter().position(|d| segments.contains(d))?;
    if idx == 0 {
        Some(".".to_string())
    } else {
        Some(dirs[..idx].join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageSet;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = abs_from_rel(root, rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn plans_for(root: &Path, language: Language, include_tests: bool) -> Vec<PackagePlan> {
        let snapshot = Snapshot::build(root, &LanguageSet::all()).unwrap();
        build_plans(&snapshot, language, include_tests, &FxHashMap::default())
    }

    fn units(plans: &[PackagePlan]) -> Vec<(&str, Vec<&str>)> {
        plans
            .iter()
            .map(|p| {
                (
                    p.rel_path.as_str(),
                    p.files.iter().map(String::as_str).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_go_units_are_directories() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "main.go", "package main\n");
        write(temp_dir.path(), "main_test.go", "package main\n");
        write(temp_dir.path(), "internal/foo/foo.go", "package foo\n");
        write(temp_dir.path(), "internal/foo/bar.go", "package foo\n");

        let plans = plans_for(temp_dir.path(), Language::Go, false);
        assert_eq!(
            units(&plans),
            vec![
                (".", vec!["main.go"]),
                ("internal/foo", vec!["internal/foo/bar.go", "internal/foo/foo.go"]),
            ]
        );

        let with_tests = plans_for(temp_dir.path(), Language::Go, true);
        assert_eq!(with_tests[0].files, vec!["main.go", "main_test.go"]);
    }

    #[test]
    fn test_rust_units_use_nearest_cargo_toml() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "Cargo.toml", "[workspace]\n");
        write(temp_dir.path(), "crates/a/Cargo.toml", "[package]\nname = \"a\"\n");
        write(temp_dir.path(), "crates/a/src/lib.rs", "pub fn a() {}\n");
        write(temp_dir.path(), "crates/a/src/x/mod.rs", "pub fn x() {}\n");
        write(temp_dir.path(), "crates/a/tests/it.rs", "fn t() {}\n");
        write(temp_dir.path(), "build.rs", "fn main() {}\n");

        let plans = plans_for(temp_dir.path(), Language::Rust, false);
        assert_eq!(
            units(&plans),
            vec![
                (".", vec!["build.rs"]),
                ("crates/a", vec!["crates/a/src/lib.rs", "crates/a/src/x/mod.rs"]),
            ]
        );
    }

    #[test]
    fn test_python_manifest_takes_precedence_over_segments() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "svc/pyproject.toml", "[project]\nname = \"svc\"\n");
        write(temp_dir.path(), "svc/src/svc/app.py", "def run():\n    pass\n");
        write(temp_dir.path(), "lib/src/util.py", "X = 1\n");
        write(temp_dir.path(), "tool.py", "def main():\n    pass\n");

        let plans = plans_for(temp_dir.path(), Language::Python, false);
        assert_eq!(
            units(&plans),
            vec![
                (".", vec!["tool.py"]),
                ("lib", vec!["lib/src/util.py"]),
                ("svc", vec!["svc/src/svc/app.py"]),
            ]
        );
    }

    #[test]
    fn test_python_src_without_manifest_roots_at_project() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "src/main.py", "def main():\n    pass\n");

        let plans = plans_for(temp_dir.path(), Language::Python, false);
        assert_eq!(units(&plans), vec![(".", vec!["src/main.py"])]);
    }

    #[test]
    fn test_shell_segment_rule_requires_trigger() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "scripts/main.sh", "#!/bin/sh\n");
        write(temp_dir.path(), "deploy/bin/run.sh", "#!/bin/sh\n");
        write(temp_dir.path(), "hack/lint.sh", "#!/bin/sh\n");

        let plans = plans_for(temp_dir.path(), Language::Shell, false);
        assert_eq!(
            units(&plans),
            vec![
                (".", vec!["scripts/main.sh"]),
                ("deploy", vec!["deploy/bin/run.sh"]),
                ("hack", vec!["hack/lint.sh"]),
            ]
        );
    }

    #[test]
    fn test_is_test_path_by_language() {
        assert!(is_test_path(Language::Rust, "tests/integration.rs", false));
        assert!(is_test_path(Language::Rust, "src/parser.spec.rs", false));
        assert!(!is_test_path(Language::Rust, "src/tests.rs", false));
        assert!(is_test_path(Language::Python, "pkg/test/helpers.py", false));
        assert!(is_test_path(Language::TypeScript, "src/__tests__/a.ts", false));
        assert!(!is_test_path(Language::Go, "tests/a.go", false));
        assert!(is_test_path(Language::Go, "a_test.go", true));
    }

    #[test]
    fn test_fingerprint_follows_state_entries() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "pkg/a.go", "package pkg\n");
        let snapshot = Snapshot::build(temp_dir.path(), &LanguageSet::all()).unwrap();

        let plans = build_plans(&snapshot, Language::Go, false, &FxHashMap::default());
        assert_eq!(plans[0].fingerprint, "");

        let entry = StateEntry::from_file(&snapshot.files[0], "h1".to_string());
        let mut by_path = FxHashMap::default();
        by_path.insert("pkg/a.go", &entry);
        let plans = build_plans(&snapshot, Language::Go, false, &by_path);
        assert_eq!(
            plans[0].fingerprint,
            crate::cache::aggregate_hash([("pkg/a.go", "h1")])
        );
    }

    #[test]
    fn test_segment_root() {
        assert_eq!(
            segment_root("a/b/src/c/x.py", PYTHON_SEGMENTS, &[]),
            Some("a/b".to_string())
        );
        assert_eq!(segment_root("x.py", PYTHON_SEGMENTS, &[]), None);
        assert_eq!(segment_root("tools/x.sh", SHELL_SEGMENTS, SHELL_TRIGGERS), None);
    }
}
