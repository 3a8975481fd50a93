//! The merged index handed to renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    /// struct, interface, class, enum, trait, type
    pub kind: String,
    pub comment: String,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>, kind: &str) -> Self {
        Self {
            name: name.into(),
            kind: kind.to_string(),
            comment: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Path within the unit
    pub name: String,
    pub line_count: usize,
    pub purpose: String,
    pub key_types: Vec<String>,
    pub key_funcs: Vec<String>,
}

/// One analyzed unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Unit identifier: import path, crate or package name
    pub import_path: String,
    pub relative_path: String,
    pub purpose: String,
    pub file_count: usize,
    pub line_count: usize,
    /// Only filled for units with at least `large_package_files` files
    pub files: Vec<FileSummary>,
    pub exported_types: Vec<TypeInfo>,
    pub imports: Vec<String>,
    /// Path of the entry file within the unit
    pub entry_point: String,
}

impl Package {
    /// Entry file relative to the project root; empty without an entry point
    pub fn entry_path(&self) -> String {
        if self.entry_point.is_empty() {
            String::new()
        } else if self.relative_path == "." || self.relative_path.is_empty() {
            self.entry_point.clone()
        } else {
            format!("{}/{}", self.relative_path, self.entry_point)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concern {
    pub name: String,
    pub patterns: Vec<String>,
    /// Sorted example paths, at most the configured limit
    pub files: Vec<String>,
    pub total_files: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codemap {
    pub project_root: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub content_hash: String,
    pub packages: Vec<Package>,
    pub concerns: Vec<Concern>,
}

impl Codemap {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            generated_at: Utc::now(),
            content_hash: String::new(),
            packages: Vec::new(),
            concerns: Vec::new(),
        }
    }
}

/// Order by relative path, identifier, entry point, then purpose.
pub fn sort_packages(packages: &mut [Package]) {
    packages.sort_by(|a, b| {
        a.relative_path
            .cmp(&b.relative_path)
            .then_with(|| a.import_path.cmp(&b.import_path))
            .then_with(|| a.entry_point.cmp(&b.entry_point))
            .then_with(|| a.purpose.cmp(&b.purpose))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(rel: &str, id: &str, entry: &str) -> Package {
        Package {
            import_path: id.to_string(),
            relative_path: rel.to_string(),
            entry_point: entry.to_string(),
            ..Package::default()
        }
    }

    #[test]
    fn test_entry_path() {
        assert_eq!(package(".", "x", "main.go").entry_path(), "main.go");
        assert_eq!(
            package("internal/foo", "x", "foo.go").entry_path(),
            "internal/foo/foo.go"
        );
        assert_eq!(package("pkg", "x", "").entry_path(), "");
    }

    #[test]
    fn test_sort_packages() {
        let mut packages = vec![
            package("b", "z", "a"),
            package("a", "y", "b"),
            package("a", "x", "c"),
            package("a", "x", "a"),
        ];
        sort_packages(&mut packages);
        let order: Vec<(&str, &str, &str)> = packages
            .iter()
            .map(|p| {
                (
                    p.relative_path.as_str(),
                    p.import_path.as_str(),
                    p.entry_point.as_str(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![("a", "x", "a"), ("a", "x", "c"), ("a", "y", "b"), ("b", "z", "a")]
        );
    }
}
