//! Per-language symbol extraction.
//!
//! Extractors turn the files of one unit into a [`Package`]. The shared
//! pieces live here: reading a unit's sources, folding per-file symbols into
//! a unit summary and picking the entry point by score.

mod go;
mod python;
mod rust;
mod shell;
mod typescript;

pub use go::{find_module_path, GoExtractor};
pub use python::PythonExtractor;
pub use rust::RustExtractor;
pub use shell::ShellExtractor;
pub use typescript::TypeScriptExtractor;

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::errors::{CodemapError, Result};
use crate::language::Language;
use crate::model::{FileSummary, Package, TypeInfo};
use crate::planner::PackagePlan;
use crate::snapshot::abs_from_rel;

/// Per-run inputs shared by every unit of one language
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    pub root: &'a Path,
    pub module_path: &'a str,
    pub large_package_files: usize,
}

pub trait LanguageExtractor: Send + Sync {
    fn language(&self) -> Language;

    /// Namespace this language's cached units are keyed by
    fn module_path(&self, _root: &Path) -> String {
        self.language().id().to_string()
    }

    /// Analyze one unit. `Ok(None)` when the unit has nothing to report.
    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>>;
}

/// The closed set of supported extractors
#[derive(Debug, Clone)]
pub enum Extractor {
    Go(GoExtractor),
    Python(PythonExtractor),
    Rust(RustExtractor),
    Shell(ShellExtractor),
    TypeScript(TypeScriptExtractor),
}

impl Extractor {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Go => Extractor::Go(GoExtractor),
            Language::Python => Extractor::Python(PythonExtractor),
            Language::Rust => Extractor::Rust(RustExtractor),
            Language::Shell => Extractor::Shell(ShellExtractor),
            Language::TypeScript => Extractor::TypeScript(TypeScriptExtractor),
        }
    }

    fn inner(&self) -> &dyn LanguageExtractor {
        match self {
            Extractor::Go(e) => e,
            Extractor::Python(e) => e,
            Extractor::Rust(e) => e,
            Extractor::Shell(e) => e,
            Extractor::TypeScript(e) => e,
        }
    }
}

impl LanguageExtractor for Extractor {
    fn language(&self) -> Language {
        self.inner().language()
    }

    fn module_path(&self, root: &Path) -> String {
        self.inner().module_path(root)
    }

    fn analyze(&self, ctx: &UnitContext<'_>, plan: &PackagePlan) -> Result<Option<Package>> {
        self.inner().analyze(ctx, plan)
    }
}

/// What one file contributes to its unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSymbols {
    pub types: Vec<TypeInfo>,
    pub funcs: Vec<String>,
    pub imports: Vec<String>,
    pub purpose: String,
}

impl FileSymbols {
    pub fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub rel_path: String,
    /// Path within the unit directory
    pub within: String,
    pub content: String,
}

/// Read every member file of a unit, in path order.
///
/// A missing or unreadable member fails the whole unit.
pub fn read_sources(root: &Path, plan: &PackagePlan) -> Result<Vec<SourceFile>> {
    let mut rel_paths = plan.files.clone();
    rel_paths.sort();

    rel_paths
        .into_iter()
        .map(|rel_path| {
            let abs = abs_from_rel(root, &rel_path);
            let bytes = std::fs::read(&abs).map_err(|e| CodemapError::io(&abs, e))?;
            Ok(SourceFile {
                within: within_unit(&rel_path, &plan.rel_path),
                content: String::from_utf8_lossy(&bytes).into_owned(),
                rel_path,
            })
        })
        .collect()
}

/// A unit folded from its files, before language-specific naming
#[derive(Debug, Clone, Default)]
pub struct UnitSummary {
    pub files: Vec<FileSummary>,
    pub types: Vec<TypeInfo>,
    pub imports: Vec<String>,
    pub purpose: String,
    pub entry_point: String,
    pub line_count: usize,
}

impl UnitSummary {
    /// Fold per-file symbols. `score` ranks entry-point candidates by their
    /// path within the unit; ties go to the smallest path.
    pub fn fold<F>(sources: &[SourceFile], symbols: Vec<FileSymbols>, score: F) -> Self
    where
        F: Fn(&str, &FileSymbols) -> i32,
    {
        let mut summary = UnitSummary::default();
        let mut best: Option<(i32, &str)> = None;

        for (source, file) in sources.iter().zip(symbols) {
            let lines = line_count(&source.content);
            summary.line_count += lines;
            if summary.purpose.is_empty() && !file.purpose.is_empty() {
                summary.purpose = file.purpose.clone();
            }

            let file_score = score(&source.within, &file);
            let better = match best {
                None => true,
                Some((s, path)) => file_score > s || (file_score == s && source.within.as_str() < path),
            };
            if better {
                best = Some((file_score, source.within.as_str()));
            }

            summary.files.push(FileSummary {
                name: source.within.clone(),
                line_count: lines,
                purpose: file.purpose.clone(),
                key_types: file.type_names(),
                key_funcs: file.funcs.clone(),
            });
            summary.types.extend(file.types);
            summary.imports.extend(file.imports);
        }

        summary.entry_point = best.map(|(_, path)| path.to_string()).unwrap_or_default();
        summary.types.sort_by(|a, b| a.name.cmp(&b.name));
        summary.imports.sort();
        summary.imports.dedup();
        summary
    }

    /// Per-file detail is kept only for units with at least `large_package_files` files
    pub fn into_package(self, import_path: String, rel_path: &str, large_package_files: usize) -> Package {
        let file_count = self.files.len();
        Package {
            import_path,
            relative_path: rel_path.to_string(),
            purpose: self.purpose,
            file_count,
            line_count: self.line_count,
            files: if file_count >= large_package_files {
                self.files
            } else {
                Vec::new()
            },
            exported_types: self.types,
            imports: self.imports,
            entry_point: self.entry_point,
        }
    }
}

/// Text up to and including the first `.`, or up to the first newline.
/// Without either, long text is cut to 100 characters plus `...`.
pub fn extract_first_sentence(text: &str) -> String {
    let text = text.trim();
    if let Some((idx, c)) = text.char_indices().find(|(_, c)| *c == '.' || *c == '\n') {
        let sentence = text[..idx + c.len_utf8()].trim();
        return if c == '.' {
            sentence.to_string()
        } else {
            sentence.trim_end_matches('.').to_string()
        };
    }
    if text.chars().count() > 100 {
        let cut: String = text.chars().take(100).collect();
        return format!("{}...", cut);
    }
    text.to_string()
}

/// Newline count plus one; empty content has no lines
pub fn line_count(content: &str) -> usize {
    if content.is_empty() {
        0
    } else {
        content.bytes().filter(|&b| b == b'\n').count() + 1
    }
}

pub(crate) fn within_unit(rel_path: &str, unit_rel: &str) -> String {
    if unit_rel == "." {
        return rel_path.to_string();
    }
    rel_path
        .strip_prefix(unit_rel)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(rel_path)
        .to_string()
}

/// Last path component of the unit, or of the root for `.`
pub(crate) fn unit_dir_name(root: &Path, unit_rel: &str) -> String {
    if unit_rel == "." || unit_rel.is_empty() {
        return root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    unit_rel.rsplit('/').next().unwrap_or(unit_rel).to_string()
}

/// Name-bearing tables of `Cargo.toml` and `pyproject.toml`
#[derive(Debug, Default, Deserialize)]
struct TomlManifest {
    package: Option<NameTable>,
    project: Option<NameTable>,
    tool: Option<ToolTable>,
}

#[derive(Debug, Default, Deserialize)]
struct NameTable {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolTable {
    poetry: Option<NameTable>,
}

fn parse_toml_manifest(content: &str) -> Option<TomlManifest> {
    match toml::from_str(content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            debug!("Unparseable TOML manifest: {}", e);
            None
        }
    }
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// `[package].name` of a `Cargo.toml`
pub(crate) fn cargo_package_name(content: &str) -> Option<String> {
    non_empty(parse_toml_manifest(content)?.package?.name)
}

/// `[project].name`, else `[tool.poetry].name`, of a `pyproject.toml`
pub(crate) fn pyproject_name(content: &str) -> Option<String> {
    let manifest = parse_toml_manifest(content)?;
    non_empty(manifest.project.and_then(|p| p.name))
        .or_else(|| non_empty(manifest.tool.and_then(|t| t.poetry).and_then(|p| p.name)))
}

/// First `key = value` (or `key: value`) inside `section` of an INI file
pub(crate) fn ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let mut in_section = false;
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_section = line[1..line.len() - 1].trim().eq_ignore_ascii_case(section);
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((k, v)) = line.split_once(|c| c == '=' || c == ':') else {
            continue;
        };
        if !k.trim().eq_ignore_ascii_case(key) {
            continue;
        }
        let value = v.trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Strip a line-comment marker and surrounding space
pub(crate) fn comment_text<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.strip_prefix(marker).map(str::trim)
}
